//! Error types for the protocol layer.
//!
//! Each crate in bangnet defines its own error enums. The protocol layer has
//! three narrow ones (encode, decode, framing) and a [`ProtocolError`] that
//! wraps them, so the transport only has to carry a single type.

/// Errors raised while turning a value into bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A string, buffer, collection or map has more elements than its
    /// 16-bit length prefix can describe.
    #[error("length {len} does not fit a 16-bit prefix (max {max})")]
    LengthOverflow {
        /// The length that was requested.
        len: usize,
        /// The largest length the prefix can carry.
        max: usize,
    },
}

/// Errors raised while reading a value back from bytes.
///
/// Every variant means the peer sent something this side cannot interpret.
/// The connection treats all of them as fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A read would have gone past the end of the buffer.
    #[error("buffer overflow: needed {needed} bytes, {remaining} remaining")]
    BufferOverflow {
        /// Bytes the decoder tried to consume.
        needed: usize,
        /// Bytes that were left.
        remaining: usize,
    },

    /// A complete message was decoded but bytes were left over.
    #[error("buffer underflow: {trailing} trailing bytes after message")]
    BufferUnderflow {
        /// Number of unread bytes.
        trailing: usize,
    },

    /// A tagged variant carried a discriminant outside its known kinds.
    #[error("invalid variant index {index} for {type_name} ({count} kinds)")]
    InvalidVariantIndex {
        /// The tagged type being decoded.
        type_name: &'static str,
        /// The discriminant found on the wire.
        index: u16,
        /// How many kinds the type declares.
        count: u16,
    },

    /// A wire enumeration carried a value it does not declare.
    #[error("invalid value {value} for enum {type_name}")]
    InvalidEnumValue {
        /// The enumeration being decoded.
        type_name: &'static str,
        /// The raw value found on the wire.
        value: u64,
    },

    /// A `String` field did not hold UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors in the fixed frame header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The first four bytes were not the protocol magic.
    #[error("bad magic 0x{found:08x} (expected 0x{expected:08x})")]
    BadMagic {
        /// Magic read from the wire.
        found: u32,
        /// Magic this protocol uses.
        expected: u32,
    },

    /// The declared body length is above the accepted maximum.
    #[error("frame length {length} exceeds maximum {max}")]
    TooLong {
        /// Declared (or attempted) body length.
        length: u64,
        /// Configured cap.
        max: u32,
    },
}

/// Any protocol-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing an outgoing message failed.
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// Deserializing an incoming message failed.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The frame header was rejected.
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),
}
