//! RBM ingest header
//!
//! A producer sends one RBM message per canvas frame:
//!
//! ```text
//! offset  size  field
//! 0       2     magic "RB"
//! 2       1     version (1)
//! 3       1     flags (bit 0 = invert)
//! 4       2     width            big-endian
//! 6       2     height           big-endian
//! 8       4     seq              big-endian, wraps at 2^32
//! 12      2     frame_duration_ms big-endian, 0 = server cadence
//! 14      2     reserved
//! 16      ...   height * ceil(width/8) bytes of packed rows
//! ```

use crate::bits::stride;
use crate::error::DecodeError;

/// Header magic
pub const RBM_MAGIC: [u8; 2] = *b"RB";

/// The only supported header version
pub const RBM_VERSION: u8 = 1;

/// Fixed header length
pub const RBM_HEADER_SIZE: usize = 16;

/// Flag bit: invert every pixel before display
pub const RBM_FLAG_INVERT: u8 = 0x01;

/// Decoded RBM header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RbmHeader {
    pub flags: u8,
    pub width: u16,
    pub height: u16,
    pub seq: u32,
    pub frame_duration_ms: u16,
}

impl RbmHeader {
    /// Header for a plain frame with server cadence
    pub fn new(width: u16, height: u16, seq: u32) -> Self {
        Self {
            flags: 0,
            width,
            height,
            seq,
            frame_duration_ms: 0,
        }
    }

    /// Bytes per packed row
    pub fn stride(&self) -> usize {
        stride(self.width as usize)
    }

    /// Bitmap bytes that must follow the header
    pub fn payload_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    pub fn invert(&self) -> bool {
        self.flags & RBM_FLAG_INVERT != 0
    }

    /// Parse the fixed 16-byte header
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < RBM_HEADER_SIZE {
            return Err(DecodeError::ShortHeader);
        }
        if bytes[0..2] != RBM_MAGIC || bytes[2] != RBM_VERSION {
            return Err(DecodeError::BadMagicOrVersion);
        }
        Ok(Self {
            flags: bytes[3],
            width: u16::from_be_bytes([bytes[4], bytes[5]]),
            height: u16::from_be_bytes([bytes[6], bytes[7]]),
            seq: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            frame_duration_ms: u16::from_be_bytes([bytes[12], bytes[13]]),
        })
    }

    /// Serialize the header (fixtures and producer simulators)
    pub fn encode(&self) -> [u8; RBM_HEADER_SIZE] {
        let mut out = [0u8; RBM_HEADER_SIZE];
        out[0..2].copy_from_slice(&RBM_MAGIC);
        out[2] = RBM_VERSION;
        out[3] = self.flags;
        out[4..6].copy_from_slice(&self.width.to_be_bytes());
        out[6..8].copy_from_slice(&self.height.to_be_bytes());
        out[8..12].copy_from_slice(&self.seq.to_be_bytes());
        out[12..14].copy_from_slice(&self.frame_duration_ms.to_be_bytes());
        out
    }
}

/// A complete RBM message borrowing its bitmap from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RbmMessage<'a> {
    pub header: RbmHeader,
    /// Exactly `header.payload_len()` bytes
    pub bitmap: &'a [u8],
}

impl<'a> RbmMessage<'a> {
    /// Decode a header plus bitmap
    ///
    /// Bytes beyond the declared bitmap are ignored.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let header = RbmHeader::parse(bytes)?;
        let body = &bytes[RBM_HEADER_SIZE..];
        let need = header.payload_len();
        if body.len() < need {
            return Err(DecodeError::ShortPayload);
        }
        Ok(Self {
            header,
            bitmap: &body[..need],
        })
    }

    /// Total bytes this message occupies on the wire
    pub fn wire_len(&self) -> usize {
        RBM_HEADER_SIZE + self.bitmap.len()
    }
}
