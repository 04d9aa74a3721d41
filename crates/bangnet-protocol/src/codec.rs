//! The binary codec: how values become bytes and back.
//!
//! The format is positional and big-endian. Nothing on the wire says what a
//! value is; encoder and decoder agree because they run the same type's code.
//!
//! | Shape | Encoding |
//! |---|---|
//! | integers, `bool` | `size_of` bytes, most significant first |
//! | `String`, [`Bytes`] | `u16` length, raw bytes |
//! | `Vec<T>` | `u16` count, each element |
//! | `BTreeMap<String, T>` | `u16` count, key/value pairs in key order |
//! | tagged variant | `u16` discriminant, payload if the kind has one |
//! | aggregate | each field in declaration order |
//! | `()` | nothing |
//!
//! Tagged variants and aggregates get their impls from the
//! [`tagged_message!`](crate::tagged_message) and
//! [`wire_struct!`](crate::wire_struct) macros.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{DecodeError, EncodeError};

/// Width of every length, count and discriminant prefix.
pub type ShortSize = u16;

/// Largest length a [`ShortSize`] prefix can carry.
pub const MAX_SHORT_LEN: usize = ShortSize::MAX as usize;

/// A value that can be written in the wire format.
pub trait Encode {
    /// Appends the encoding of `self` to `out`.
    ///
    /// # Errors
    /// Returns [`EncodeError::LengthOverflow`] when a length-prefixed part is
    /// longer than [`MAX_SHORT_LEN`]. `out` may hold a partial encoding
    /// afterwards and should be discarded.
    fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError>;

    /// Exact number of bytes [`encode`](Self::encode) will append.
    fn encoded_len(&self) -> usize;
}

/// A value that can be read back from the wire format.
pub trait Decode: Sized {
    /// Reads one value from `reader`, advancing it past the value.
    ///
    /// # Errors
    /// Returns a [`DecodeError`] if the bytes run out or do not describe a
    /// valid value. Implementations never read past the reader's end.
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError>;
}

/// A reflected aggregate: its fields, in wire order.
pub trait Schema {
    /// Field names in the order they are encoded.
    const FIELDS: &'static [&'static str];
}

/// A closed set of alternatives encoded as discriminant + optional payload.
pub trait TaggedVariant {
    /// Number of declared alternatives. Valid discriminants are `0..VARIANT_COUNT`.
    const VARIANT_COUNT: u16;

    /// Ordinal of the alternative held by `self`.
    fn discriminant(&self) -> u16;

    /// Name of the alternative held by `self`, for logs.
    fn kind_name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A bounded cursor over an input buffer.
///
/// Every read checks the remaining length first, so decoding can never run
/// past the end no matter what lengths the peer claims.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Creates a reader over the whole of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Whether the cursor reached the end.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fails with [`DecodeError::BufferOverflow`] unless `n` bytes remain.
    pub fn ensure(&self, n: usize) -> Result<(), DecodeError> {
        if n > self.buf.len() {
            return Err(DecodeError::BufferOverflow {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Consumes and returns the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a `u16` length or count prefix.
    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        ShortSize::decode(self).map(usize::from)
    }
}

/// Writes a `u16` length prefix, refusing lengths that do not fit.
pub fn encode_len<B: BufMut>(len: usize, out: &mut B) -> Result<(), EncodeError> {
    let prefix = ShortSize::try_from(len).map_err(|_| EncodeError::LengthOverflow {
        len,
        max: MAX_SHORT_LEN,
    })?;
    out.put_u16(prefix);
    Ok(())
}

// ---------------------------------------------------------------------------
// Top-level helpers
// ---------------------------------------------------------------------------

/// Encodes `value` into a fresh, exactly sized buffer.
pub fn encode_to_bytes<T: Encode + ?Sized>(value: &T) -> Result<Bytes, EncodeError> {
    let mut out = BytesMut::with_capacity(value.encoded_len());
    value.encode(&mut out)?;
    Ok(out.freeze())
}

/// Decodes exactly one `T` from `bytes`.
///
/// # Errors
/// Besides the errors of `T::decode`, returns
/// [`DecodeError::BufferUnderflow`] if bytes remain after the value.
pub fn decode_exact<T: Decode>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut reader = Reader::new(bytes);
    let value = T::decode(&mut reader)?;
    if !reader.is_empty() {
        return Err(DecodeError::BufferUnderflow {
            trailing: reader.remaining(),
        });
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Primitive impls
// ---------------------------------------------------------------------------

macro_rules! impl_integer {
    ($($ty:ty => $get:ident, $put:ident;)*) => {
        $(
            impl Encode for $ty {
                fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError> {
                    out.$put(*self);
                    Ok(())
                }

                fn encoded_len(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }
            }

            impl Decode for $ty {
                fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
                    reader.ensure(std::mem::size_of::<$ty>())?;
                    Ok(reader.buf.$get())
                }
            }
        )*
    };
}

impl_integer! {
    u8 => get_u8, put_u8;
    u16 => get_u16, put_u16;
    u32 => get_u32, put_u32;
    u64 => get_u64, put_u64;
    i8 => get_i8, put_i8;
    i16 => get_i16, put_i16;
    i32 => get_i32, put_i32;
    i64 => get_i64, put_i64;
}

impl Encode for bool {
    fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError> {
        out.put_u8(u8::from(*self));
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        1
    }
}

impl Decode for bool {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        u8::decode(reader).map(|b| b != 0)
    }
}

impl Encode for () {
    fn encode<B: BufMut>(&self, _out: &mut B) -> Result<(), EncodeError> {
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        0
    }
}

impl Decode for () {
    fn decode(_reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl Encode for str {
    fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError> {
        encode_len(self.len(), out)?;
        out.put_slice(self.as_bytes());
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        2 + self.len()
    }
}

impl Encode for String {
    fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError> {
        self.as_str().encode(out)
    }

    fn encoded_len(&self) -> usize {
        self.as_str().encoded_len()
    }
}

impl Decode for String {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let len = reader.read_len()?;
        let raw = reader.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }
}

/// Opaque byte buffers carry any bytes at all.
impl Encode for Bytes {
    fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError> {
        encode_len(self.len(), out)?;
        out.put_slice(self);
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        2 + self.len()
    }
}

impl Decode for Bytes {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let len = reader.read_len()?;
        reader.take(len).map(Bytes::copy_from_slice)
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

impl<T: Encode> Encode for Vec<T> {
    fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError> {
        encode_len(self.len(), out)?;
        for item in self {
            item.encode(out)?;
        }
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        2 + self.iter().map(Encode::encoded_len).sum::<usize>()
    }
}

/// How many elements to reserve for a peer-supplied `count` with
/// `remaining` body bytes left. The reservation never takes more memory
/// than the rest of the body.
fn reserve_hint<T>(count: usize, remaining: usize) -> usize {
    count.min(remaining / std::mem::size_of::<T>().max(1))
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_len()?;
        let mut items = Vec::with_capacity(reserve_hint::<T>(count, reader.remaining()));
        for _ in 0..count {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl<T: Encode> Encode for BTreeMap<String, T> {
    fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError> {
        encode_len(self.len(), out)?;
        for (key, value) in self {
            key.encode(out)?;
            value.encode(out)?;
        }
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        2 + self
            .iter()
            .map(|(key, value)| key.encoded_len() + value.encoded_len())
            .sum::<usize>()
    }
}

impl<T: Decode> Decode for BTreeMap<String, T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_len()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = String::decode(reader)?;
            let value = T::decode(reader)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}
