//! Decode errors shared by the ingest formats

use core::fmt;

/// Errors raised while decoding an RBM or FDIS message
///
/// A decode error always rejects the whole message; nothing is partially
/// applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Fewer bytes than the fixed header size
    ShortHeader,
    /// RBM magic is not "RB" or version is not 1
    BadMagicOrVersion,
    /// FDIS magic is not "FDIS"
    BadMagic,
    /// Width or height outside 1..=1024
    DimensionOutOfRange,
    /// Declared payload length disagrees with the dimensions
    PayloadLengthMismatch,
    /// Fewer bitmap bytes than the header promises
    ShortPayload,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DecodeError::ShortHeader => "short header",
            DecodeError::BadMagicOrVersion => "bad magic/version",
            DecodeError::BadMagic => "bad magic",
            DecodeError::DimensionOutOfRange => "width/height out of range",
            DecodeError::PayloadLengthMismatch => "payload length does not match dimensions",
            DecodeError::ShortPayload => "short payload",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for DecodeError {}
