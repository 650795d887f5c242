//! Panel bus frame encoding and parsing.
//!
//! Frame format:
//! - START (1 byte): 0x80
//! - COMMAND (1 byte): width/refresh selector, see [`crate::command`]
//! - ADDRESS (1 byte): panel bus address, 0xFF broadcast
//! - DATA (0, 7, 14 or 28 bytes): column-folded pixels
//! - END (1 byte): 0x8F
//!
//! Column bytes never exceed 0x7F on 7-row panels, so START and END cannot
//! appear inside DATA and a reader can resynchronise on START.

use heapless::Vec;

use crate::command::{
    command_data_len, command_refresh, DataWidth, EncodeError, RefreshMode, CMD_FLUSH,
};

/// Frame synchronization byte
pub const FRAME_START: u8 = 0x80;

/// Frame terminator
pub const FRAME_END: u8 = 0x8F;

/// Address every panel listens on
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Widest data section the hardware accepts
pub const MAX_DATA_BYTES: usize = 28;

/// Maximum complete frame size (START + COMMAND + ADDRESS + DATA + END)
pub const MAX_FRAME_SIZE: usize = 3 + MAX_DATA_BYTES + 1;

/// Errors raised while parsing a captured bus stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Command byte has no table entry
    UnknownCommand(u8),
    /// Byte after DATA was not 0x8F
    MissingTerminator,
}

/// An encoded panel bus frame, ready to write to the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFrame {
    bytes: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl BusFrame {
    /// Frame one panel's column data
    ///
    /// The data length picks the command byte; a length without a table
    /// entry fails with [`EncodeError::UnsupportedDataWidth`].
    pub fn panel(address: u8, data: &[u8], mode: RefreshMode) -> Result<Self, EncodeError> {
        let command = DataWidth::from_len(data.len())?.command(mode)?;

        let mut bytes = [0u8; MAX_FRAME_SIZE];
        bytes[0] = FRAME_START;
        bytes[1] = command;
        bytes[2] = address;
        bytes[3..3 + data.len()].copy_from_slice(data);
        bytes[3 + data.len()] = FRAME_END;

        Ok(Self {
            bytes,
            len: 4 + data.len(),
        })
    }

    /// Broadcast flush: `80 82 FF 8F`
    pub fn flush() -> Self {
        let mut bytes = [0u8; MAX_FRAME_SIZE];
        bytes[..4].copy_from_slice(&[FRAME_START, CMD_FLUSH, BROADCAST_ADDRESS, FRAME_END]);
        Self { bytes, len: 4 }
    }

    /// Wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Length on the wire
    pub fn len(&self) -> usize {
        self.len
    }

    /// Frames always carry at least START, COMMAND, ADDRESS and END
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn command(&self) -> u8 {
        self.bytes[1]
    }

    pub fn address(&self) -> u8 {
        self.bytes[2]
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[3..self.len - 1]
    }

    /// Whether this is the broadcast flush frame
    pub fn is_flush(&self) -> bool {
        self.command() == CMD_FLUSH
    }
}

/// A frame recovered from a bus capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBusFrame {
    pub command: u8,
    pub address: u8,
    pub data: Vec<u8, MAX_DATA_BYTES>,
}

impl ParsedBusFrame {
    /// Refresh mode of a panel frame, `None` for the flush
    pub fn refresh(&self) -> Option<RefreshMode> {
        command_refresh(self.command)
    }

    pub fn is_flush(&self) -> bool {
        self.command == CMD_FLUSH
    }
}

/// State machine for parsing a captured panel bus stream
///
/// Used by the bus sniffer and by tests that check what a transport
/// actually put on the line.
#[derive(Debug, Clone)]
pub struct BusFrameParser {
    state: ParseState,
    command: u8,
    address: u8,
    expected_len: usize,
    data: Vec<u8, MAX_DATA_BYTES>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Waiting for START byte
    WaitingForStart,
    /// Got START, waiting for COMMAND
    WaitingForCommand,
    /// Got COMMAND, waiting for ADDRESS
    WaitingForAddress,
    /// Reading data bytes
    ReadingData,
    /// Waiting for END
    WaitingForEnd,
}

impl Default for BusFrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BusFrameParser {
    /// Create a new frame parser
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitingForStart,
            command: 0,
            address: 0,
            expected_len: 0,
            data: Vec::new(),
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.state = ParseState::WaitingForStart;
        self.command = 0;
        self.address = 0;
        self.expected_len = 0;
        self.data.clear();
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(frame))` when a complete frame is parsed,
    /// `Ok(None)` when more bytes are needed, or `Err` on parse error.
    pub fn feed(&mut self, byte: u8) -> Result<Option<ParsedBusFrame>, FrameError> {
        match self.state {
            ParseState::WaitingForStart => {
                if byte == FRAME_START {
                    self.state = ParseState::WaitingForCommand;
                }
                Ok(None)
            }
            ParseState::WaitingForCommand => match command_data_len(byte) {
                Some(len) => {
                    self.command = byte;
                    self.expected_len = len;
                    self.state = ParseState::WaitingForAddress;
                    Ok(None)
                }
                None => {
                    self.reset();
                    Err(FrameError::UnknownCommand(byte))
                }
            },
            ParseState::WaitingForAddress => {
                self.address = byte;
                self.data.clear();
                self.state = if self.expected_len == 0 {
                    ParseState::WaitingForEnd
                } else {
                    ParseState::ReadingData
                };
                Ok(None)
            }
            ParseState::ReadingData => {
                // expected_len never exceeds MAX_DATA_BYTES
                let _ = self.data.push(byte);
                if self.data.len() == self.expected_len {
                    self.state = ParseState::WaitingForEnd;
                }
                Ok(None)
            }
            ParseState::WaitingForEnd => {
                if byte != FRAME_END {
                    self.reset();
                    return Err(FrameError::MissingTerminator);
                }
                let frame = ParsedBusFrame {
                    command: self.command,
                    address: self.address,
                    data: self.data.clone(),
                };
                self.reset();
                Ok(Some(frame))
            }
        }
    }

    /// Feed multiple bytes to the parser
    ///
    /// Returns the first complete frame and the number of bytes consumed.
    pub fn feed_bytes(
        &mut self,
        bytes: &[u8],
    ) -> Result<(Option<ParsedBusFrame>, usize), FrameError> {
        for (i, &byte) in bytes.iter().enumerate() {
            if let Some(frame) = self.feed(byte)? {
                return Ok((Some(frame), i + 1));
            }
        }
        Ok((None, bytes.len()))
    }
}
