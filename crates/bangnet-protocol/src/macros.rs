//! Declarative schemas for wire types.
//!
//! Messages are not reflected at runtime. Instead each message type is
//! declared through one of three macros, and the macro writes the codec for
//! it in the same order the fields or alternatives are listed:
//!
//! - [`wire_struct!`](crate::wire_struct): an aggregate. Fields are encoded
//!   one after another; [`Schema::FIELDS`](crate::Schema) lists them.
//! - [`wire_enum!`](crate::wire_enum): a field-less enumeration stored as
//!   its ordinal in a fixed-width unsigned integer.
//! - [`tagged_message!`](crate::tagged_message): a closed set of
//!   alternatives, each with zero or one payload, plus a companion `Kind`
//!   enum naming the alternatives.
//!
//! Reordering fields or alternatives changes the wire format. Both peers must
//! be built from the same declarations.

/// Declares an aggregate and its positional codec.
///
/// ```
/// bangnet_protocol::wire_struct! {
///     /// A seat at the table.
///     #[derive(Debug, Clone, PartialEq, Eq)]
///     pub struct Seat {
///         pub user_id: i32,
///         pub name: String,
///     }
/// }
///
/// use bangnet_protocol::{Schema, decode_exact, encode_to_bytes};
///
/// let seat = Seat { user_id: 3, name: "Willy".into() };
/// let bytes = encode_to_bytes(&seat).unwrap();
/// assert_eq!(decode_exact::<Seat>(&bytes).unwrap(), seat);
/// assert_eq!(Seat::FIELDS, &["user_id", "name"]);
/// ```
#[macro_export]
macro_rules! wire_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::Schema for $name {
            const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];
        }

        impl $crate::Encode for $name {
            #[allow(unused_variables)]
            fn encode<B: $crate::bytes::BufMut>(
                &self,
                out: &mut B,
            ) -> ::core::result::Result<(), $crate::EncodeError> {
                $( $crate::Encode::encode(&self.$field, out)?; )*
                ::core::result::Result::Ok(())
            }

            fn encoded_len(&self) -> usize {
                0 $( + $crate::Encode::encoded_len(&self.$field) )*
            }
        }

        impl $crate::Decode for $name {
            #[allow(unused_variables)]
            fn decode(
                reader: &mut $crate::Reader<'_>,
            ) -> ::core::result::Result<Self, $crate::DecodeError> {
                // Struct literal fields are evaluated in the order written.
                ::core::result::Result::Ok(Self {
                    $( $field: <$ty as $crate::Decode>::decode(reader)?, )*
                })
            }
        }
    };
}

/// Declares a field-less enumeration stored as its ordinal.
///
/// The macro derives `Debug, Clone, Copy, PartialEq, Eq, Hash` itself; pass
/// only docs or other attributes.
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr($repr)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl $name {
            /// Every value, in wire order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            /// Looks up a value by its wire representation.
            pub fn from_repr(raw: $repr) -> ::core::option::Option<Self> {
                usize::try_from(raw)
                    .ok()
                    .and_then(|index| Self::ALL.get(index))
                    .copied()
            }
        }

        impl $crate::Encode for $name {
            fn encode<B: $crate::bytes::BufMut>(
                &self,
                out: &mut B,
            ) -> ::core::result::Result<(), $crate::EncodeError> {
                $crate::Encode::encode(&(*self as $repr), out)
            }

            fn encoded_len(&self) -> usize {
                ::core::mem::size_of::<$repr>()
            }
        }

        impl $crate::Decode for $name {
            fn decode(
                reader: &mut $crate::Reader<'_>,
            ) -> ::core::result::Result<Self, $crate::DecodeError> {
                let raw = <$repr as $crate::Decode>::decode(reader)?;
                Self::from_repr(raw).ok_or($crate::DecodeError::InvalidEnumValue {
                    type_name: stringify!($name),
                    value: u64::from(raw),
                })
            }
        }
    };
}

/// Declares a tagged message: a native enum whose alternatives carry zero or
/// one payload, and a companion `Kind` enum.
///
/// The discriminant of an alternative is its position in the list. Payload
/// types must implement [`Encode`](crate::Encode) and
/// [`Decode`](crate::Decode).
///
/// ```
/// bangnet_protocol::tagged_message! {
///     #[derive(Debug, Clone, PartialEq, Eq)]
///     pub enum Probe {
///         kind = ProbeKind;
///         Ping,
///         Echo(String),
///     }
/// }
///
/// use bangnet_protocol::{TaggedVariant, decode_exact, encode_to_bytes};
///
/// let probe = Probe::Echo("hi".into());
/// assert_eq!(probe.kind(), ProbeKind::Echo);
/// assert_eq!(probe.discriminant(), 1);
/// let bytes = encode_to_bytes(&probe).unwrap();
/// assert_eq!(decode_exact::<Probe>(&bytes).unwrap(), probe);
/// ```
#[macro_export]
macro_rules! tagged_message {
    (@bind $binding:ident $payload:ty) => {
        $binding
    };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            kind = $kind:ident;
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( ( $payload:ty ) )?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $( ($payload) )?,
            )*
        }

        #[doc = concat!("The alternatives of [`", stringify!($name), "`], in wire order.")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        $vis enum $kind {
            $(
                #[allow(missing_docs)]
                $variant,
            )*
        }

        impl $kind {
            /// Every kind, in wire order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            /// The discriminant written on the wire for this kind.
            pub const fn index(self) -> u16 {
                self as u16
            }

            /// Looks up a kind by discriminant.
            pub fn from_index(index: u16) -> ::core::option::Option<Self> {
                Self::ALL.get(usize::from(index)).copied()
            }

            /// The alternative's name as declared.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($variant), )*
                }
            }
        }

        impl $name {
            /// Which alternative this value holds.
            pub fn kind(&self) -> $kind {
                match self {
                    $( Self::$variant { .. } => $kind::$variant, )*
                }
            }
        }

        impl $crate::TaggedVariant for $name {
            const VARIANT_COUNT: u16 = $kind::ALL.len() as u16;

            fn discriminant(&self) -> u16 {
                self.kind().index()
            }

            fn kind_name(&self) -> &'static str {
                self.kind().name()
            }
        }

        impl $crate::Encode for $name {
            fn encode<B: $crate::bytes::BufMut>(
                &self,
                out: &mut B,
            ) -> ::core::result::Result<(), $crate::EncodeError> {
                $crate::Encode::encode(&self.kind().index(), out)?;
                match self {
                    $(
                        Self::$variant $( ($crate::tagged_message!(@bind value $payload)) )? => {
                            $( <$payload as $crate::Encode>::encode(value, out)?; )?
                        }
                    )*
                }
                ::core::result::Result::Ok(())
            }

            fn encoded_len(&self) -> usize {
                let payload = match self {
                    $(
                        Self::$variant $( ($crate::tagged_message!(@bind value $payload)) )? => {
                            0 $( + <$payload as $crate::Encode>::encoded_len(value) )?
                        }
                    )*
                };
                ::core::mem::size_of::<u16>() + payload
            }
        }

        impl $crate::Decode for $name {
            fn decode(
                reader: &mut $crate::Reader<'_>,
            ) -> ::core::result::Result<Self, $crate::DecodeError> {
                let index = <u16 as $crate::Decode>::decode(reader)?;
                let kind = $kind::from_index(index).ok_or($crate::DecodeError::InvalidVariantIndex {
                    type_name: stringify!($name),
                    index,
                    count: <Self as $crate::TaggedVariant>::VARIANT_COUNT,
                })?;
                ::core::result::Result::Ok(match kind {
                    $(
                        $kind::$variant => Self::$variant $(
                            (<$payload as $crate::Decode>::decode(reader)?)
                        )?,
                    )*
                })
            }
        }
    };
}
