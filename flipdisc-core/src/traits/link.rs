//! Serial link trait for the panel bus

use alloc::boxed::Box;
use core::fmt;

use crate::config::SerialSettings;

/// Errors reported by a serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Device could not be opened
    Open,
    /// Operation on a link that is not open
    NotOpen,
    /// Driver-level I/O failure
    Io,
    /// Driver timed out
    Timeout,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LinkError::Open => "failed to open serial device",
            LinkError::NotOpen => "serial device not open",
            LinkError::Io => "serial I/O error",
            LinkError::Timeout => "serial write timed out",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for LinkError {}

/// Byte-level access to the RS-485 line
///
/// A hardware port and a capturing mock are the two implementations; the
/// transport picks one at construction and never cares which.
pub trait SerialLink {
    /// Open the device with the given line settings
    fn open(&mut self, settings: &SerialSettings) -> Result<(), LinkError>;

    /// Close the device; closing a closed link is a no-op
    fn close(&mut self) -> Result<(), LinkError>;

    /// Write bytes, returning how many the driver accepted
    ///
    /// A short count is returned as-is; deciding whether it is an error is
    /// the caller's job.
    fn write(&mut self, data: &[u8]) -> Result<usize, LinkError>;

    /// Block until written bytes have left the driver
    fn flush(&mut self) -> Result<(), LinkError>;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn open(&mut self, settings: &SerialSettings) -> Result<(), LinkError> {
        (**self).open(settings)
    }

    fn close(&mut self) -> Result<(), LinkError> {
        (**self).close()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        (**self).flush()
    }
}
