//! Panel bus command table
//!
//! The hardware exposes three physical data-bus widths. Each width has its
//! own command byte for instant refresh and, for 14 and 28 bytes, a second
//! one for buffered refresh. The flush command carries no data.

use core::fmt;

/// 7-byte panels, instant refresh only
pub const CMD_7_INSTANT: u8 = 0x87;
/// 14-byte panels, instant refresh
pub const CMD_14_INSTANT: u8 = 0x92;
/// 14-byte panels, buffered refresh
pub const CMD_14_BUFFERED: u8 = 0x93;
/// 28-byte panels, instant refresh
pub const CMD_28_INSTANT: u8 = 0x83;
/// 28-byte panels, buffered refresh
pub const CMD_28_BUFFERED: u8 = 0x84;
/// Apply all buffered data
pub const CMD_FLUSH: u8 = 0x82;

/// Errors raised while building panel bus frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// No command byte exists for this many data bytes
    UnsupportedDataWidth(usize),
    /// The data width has no buffered command (7-byte panels)
    UnsupportedRefresh,
    /// More than 8 rows cannot be folded into a column byte
    ColumnTooTall,
    /// Row data is shorter than width and height require
    ShortRows,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::UnsupportedDataWidth(n) => write!(f, "unsupported data width: {} bytes", n),
            EncodeError::UnsupportedRefresh => f.write_str("buffered refresh not supported at this width"),
            EncodeError::ColumnTooTall => f.write_str("panel taller than 8 rows"),
            EncodeError::ShortRows => f.write_str("row data too short"),
        }
    }
}

impl core::error::Error for EncodeError {}

/// How the panel applies received data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RefreshMode {
    /// Flip discs as soon as the frame arrives
    Instant,
    /// Hold the data until a flush frame
    Buffered,
}

/// Physical data-bus widths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataWidth {
    Bytes7,
    Bytes14,
    Bytes28,
}

impl DataWidth {
    /// Look up the width class for a payload length
    pub fn from_len(len: usize) -> Result<Self, EncodeError> {
        match len {
            7 => Ok(DataWidth::Bytes7),
            14 => Ok(DataWidth::Bytes14),
            28 => Ok(DataWidth::Bytes28),
            other => Err(EncodeError::UnsupportedDataWidth(other)),
        }
    }

    /// Number of data bytes
    pub fn bytes(self) -> usize {
        match self {
            DataWidth::Bytes7 => 7,
            DataWidth::Bytes14 => 14,
            DataWidth::Bytes28 => 28,
        }
    }

    /// Whether the hardware can hold data at this width until a flush
    pub fn supports_buffered(self) -> bool {
        !matches!(self, DataWidth::Bytes7)
    }

    /// Command byte for this width and refresh mode
    pub fn command(self, mode: RefreshMode) -> Result<u8, EncodeError> {
        match (self, mode) {
            (DataWidth::Bytes7, RefreshMode::Instant) => Ok(CMD_7_INSTANT),
            (DataWidth::Bytes7, RefreshMode::Buffered) => Err(EncodeError::UnsupportedRefresh),
            (DataWidth::Bytes14, RefreshMode::Instant) => Ok(CMD_14_INSTANT),
            (DataWidth::Bytes14, RefreshMode::Buffered) => Ok(CMD_14_BUFFERED),
            (DataWidth::Bytes28, RefreshMode::Instant) => Ok(CMD_28_INSTANT),
            (DataWidth::Bytes28, RefreshMode::Buffered) => Ok(CMD_28_BUFFERED),
        }
    }
}

/// Command byte for a payload of `data_len` bytes
///
/// A length with no table entry is an error; it is never rounded to a
/// nearby width.
pub fn command_byte(data_len: usize, mode: RefreshMode) -> Result<u8, EncodeError> {
    DataWidth::from_len(data_len)?.command(mode)
}

/// Number of data bytes that follow a command byte, `None` if unknown
pub fn command_data_len(command: u8) -> Option<usize> {
    match command {
        CMD_FLUSH => Some(0),
        CMD_7_INSTANT => Some(7),
        CMD_14_INSTANT | CMD_14_BUFFERED => Some(14),
        CMD_28_INSTANT | CMD_28_BUFFERED => Some(28),
        _ => None,
    }
}

/// Refresh mode a command byte selects, `None` for flush or unknown
pub fn command_refresh(command: u8) -> Option<RefreshMode> {
    match command {
        CMD_7_INSTANT | CMD_14_INSTANT | CMD_28_INSTANT => Some(RefreshMode::Instant),
        CMD_14_BUFFERED | CMD_28_BUFFERED => Some(RefreshMode::Buffered),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_table() {
        assert_eq!(command_byte(7, RefreshMode::Instant), Ok(0x87));
        assert_eq!(command_byte(14, RefreshMode::Instant), Ok(0x92));
        assert_eq!(command_byte(14, RefreshMode::Buffered), Ok(0x93));
        assert_eq!(command_byte(28, RefreshMode::Instant), Ok(0x83));
        assert_eq!(command_byte(28, RefreshMode::Buffered), Ok(0x84));
    }

    #[test]
    fn test_seven_bytes_has_no_buffered_command() {
        assert_eq!(
            command_byte(7, RefreshMode::Buffered),
            Err(EncodeError::UnsupportedRefresh)
        );
        assert!(!DataWidth::Bytes7.supports_buffered());
        assert!(DataWidth::Bytes14.supports_buffered());
    }

    #[test]
    fn test_unknown_width_is_not_coerced() {
        for len in [0, 6, 8, 13, 15, 27, 29, 56] {
            assert_eq!(
                command_byte(len, RefreshMode::Instant),
                Err(EncodeError::UnsupportedDataWidth(len))
            );
        }
    }

    #[test]
    fn test_data_len_lookup() {
        assert_eq!(command_data_len(CMD_FLUSH), Some(0));
        assert_eq!(command_data_len(0x93), Some(14));
        assert_eq!(command_data_len(0x84), Some(28));
        assert_eq!(command_data_len(0x00), None);
        assert_eq!(command_refresh(0x84), Some(RefreshMode::Buffered));
        assert_eq!(command_refresh(CMD_FLUSH), None);
    }
}
