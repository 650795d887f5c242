//! FDIS frame
//!
//! Binary frame pushed by remote producers over a richer channel:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "FDIS"
//! 4       2     seq          little-endian, wraps at 2^16
//! 6       4     timestamp    little-endian
//! 10      2     width        little-endian, 1..=1024
//! 12      2     height       little-endian, 1..=1024
//! 14      2     payload_len  little-endian, == ceil(width/8) * height
//! 16      ...   bitmap
//! ```
//!
//! A payload length that disagrees with the dimensions is rejected outright;
//! the bitmap is never truncated or padded to fit.

use crate::bits::stride;
use crate::error::DecodeError;

/// Frame magic
pub const FDIS_MAGIC: [u8; 4] = *b"FDIS";

/// Fixed header length
pub const FDIS_HEADER_SIZE: usize = 16;

/// Largest accepted width or height
pub const FDIS_MAX_DIMENSION: u16 = 1024;

/// A decoded FDIS frame borrowing its bitmap from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdisFrame<'a> {
    pub seq: u16,
    pub timestamp: u32,
    pub width: u16,
    pub height: u16,
    pub bitmap: &'a [u8],
}

impl<'a> FdisFrame<'a> {
    /// Bitmap length the dimensions require
    pub fn expected_payload_len(width: u16, height: u16) -> usize {
        stride(width as usize) * height as usize
    }

    /// Decode one frame
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        if bytes.len() < FDIS_HEADER_SIZE {
            return Err(DecodeError::ShortHeader);
        }
        if bytes[0..4] != FDIS_MAGIC {
            return Err(DecodeError::BadMagic);
        }

        let seq = u16::from_le_bytes([bytes[4], bytes[5]]);
        let timestamp = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let width = u16::from_le_bytes([bytes[10], bytes[11]]);
        let height = u16::from_le_bytes([bytes[12], bytes[13]]);
        let payload_len = u16::from_le_bytes([bytes[14], bytes[15]]) as usize;

        let in_range = |d: u16| (1..=FDIS_MAX_DIMENSION).contains(&d);
        if !in_range(width) || !in_range(height) {
            return Err(DecodeError::DimensionOutOfRange);
        }
        if payload_len != Self::expected_payload_len(width, height) {
            return Err(DecodeError::PayloadLengthMismatch);
        }

        let body = &bytes[FDIS_HEADER_SIZE..];
        if body.len() < payload_len {
            return Err(DecodeError::ShortPayload);
        }

        Ok(Self {
            seq,
            timestamp,
            width,
            height,
            bitmap: &body[..payload_len],
        })
    }

    /// Write the header with an explicit payload length (fixtures only)
    pub fn encode_header(
        seq: u16,
        timestamp: u32,
        width: u16,
        height: u16,
        payload_len: u16,
    ) -> [u8; FDIS_HEADER_SIZE] {
        let mut out = [0u8; FDIS_HEADER_SIZE];
        out[0..4].copy_from_slice(&FDIS_MAGIC);
        out[4..6].copy_from_slice(&seq.to_le_bytes());
        out[6..10].copy_from_slice(&timestamp.to_le_bytes());
        out[10..12].copy_from_slice(&width.to_le_bytes());
        out[12..14].copy_from_slice(&height.to_le_bytes());
        out[14..16].copy_from_slice(&payload_len.to_le_bytes());
        out
    }

    /// Encode this frame into a byte buffer
    ///
    /// Returns the number of bytes written, or `None` if the buffer is too
    /// small.
    pub fn encode(&self, buffer: &mut [u8]) -> Option<usize> {
        let total = FDIS_HEADER_SIZE + self.bitmap.len();
        if buffer.len() < total || self.bitmap.len() > u16::MAX as usize {
            return None;
        }
        let header = Self::encode_header(
            self.seq,
            self.timestamp,
            self.width,
            self.height,
            self.bitmap.len() as u16,
        );
        buffer[..FDIS_HEADER_SIZE].copy_from_slice(&header);
        buffer[FDIS_HEADER_SIZE..total].copy_from_slice(self.bitmap);
        Some(total)
    }
}
