//! The fixed frame header and frame assembly.
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! +-----------------+-----------------+---------------------------+
//! | magic (4 bytes) | length (4 bytes)| body (length bytes)       |
//! +-----------------+-----------------+---------------------------+
//! ```
//!
//! The reader fetches exactly [`FrameHeader::SIZE`] bytes, validates them,
//! and only then reads `length` body bytes. The length cap bounds how much a
//! single frame can make the receiver allocate.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Encode, FrameError, ProtocolError};

/// Protocol magic, `"BANG"` in ASCII.
pub const MAGIC: u32 = 0x4241_4E47;

/// Default cap on a frame body (256 KiB).
pub const MAX_FRAME_LENGTH: u32 = 256 * 1024;

/// The fixed preamble of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Must equal [`MAGIC`].
    pub magic: u32,
    /// Number of body bytes that follow the header.
    pub length: u32,
}

impl FrameHeader {
    /// Encoded size of a header.
    pub const SIZE: usize = 8;

    /// A header announcing a body of `length` bytes.
    pub fn new(length: u32) -> Self {
        Self {
            magic: MAGIC,
            length,
        }
    }

    /// Big-endian wire representation.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// Parses a header. Any 8 bytes parse; use [`check`](Self::check) to
    /// find out whether they make sense.
    pub fn from_bytes(buf: [u8; Self::SIZE]) -> Self {
        Self {
            magic: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    /// True if the magic matches and the body fits [`MAX_FRAME_LENGTH`].
    pub fn validate(&self) -> bool {
        self.check(MAX_FRAME_LENGTH).is_ok()
    }

    /// Validates against a specific body cap and says what is wrong.
    pub fn check(&self, max_length: u32) -> Result<(), FrameError> {
        if self.magic != MAGIC {
            return Err(FrameError::BadMagic {
                found: self.magic,
                expected: MAGIC,
            });
        }
        if self.length > max_length {
            return Err(FrameError::TooLong {
                length: u64::from(self.length),
                max: max_length,
            });
        }
        Ok(())
    }
}

/// Encodes `message` as a complete frame, header included.
///
/// # Errors
/// Returns [`FrameError::TooLong`] when the body would exceed `max_length`
/// (the peer would reject it anyway), or the message's encode error.
pub fn encode_frame<T: Encode + ?Sized>(
    message: &T,
    max_length: u32,
) -> Result<Bytes, ProtocolError> {
    let body_len = message.encoded_len();
    let length = u32::try_from(body_len)
        .ok()
        .filter(|len| *len <= max_length)
        .ok_or(FrameError::TooLong {
            length: body_len as u64,
            max: max_length,
        })?;

    let mut out = BytesMut::with_capacity(FrameHeader::SIZE + body_len);
    out.put_slice(&FrameHeader::new(length).to_bytes());
    message.encode(&mut out)?;
    debug_assert_eq!(out.len(), FrameHeader::SIZE + body_len);
    Ok(out.freeze())
}
