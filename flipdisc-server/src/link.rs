//! Serial link implementations
//!
//! - [`SerialPortLink`] drives a real RS-485 adapter through `serialport`
//! - [`MockLink`] captures every write in memory, for tests and for running
//!   the server without hardware

use std::cell::RefCell;
use std::io::{ErrorKind, Write};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use log::{debug, info, trace, warn};
use serialport::{FlowControl, SerialPort};

use flipdisc_core::config::{DataBits, Parity, SerialSettings, StopBits};
use flipdisc_core::traits::{LinkError, SerialLink};
use flipdisc_protocol::{BusFrameParser, ParsedBusFrame};

use crate::config::SerialConfig;

/// Link type chosen at startup
pub type DynLink = Box<dyn SerialLink + Send>;

/// Pick the hardware or mock link from config
pub fn build_link(config: &SerialConfig) -> DynLink {
    if config.mock {
        info!("Using mock serial link");
        Box::new(MockLink::new())
    } else {
        Box::new(SerialPortLink::new(&config.device))
    }
}

/// Hardware serial port
pub struct SerialPortLink {
    device: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortLink {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            port: None,
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or(LinkError::NotOpen)
    }
}

fn map_io(err: std::io::Error) -> LinkError {
    if err.kind() == ErrorKind::TimedOut {
        LinkError::Timeout
    } else {
        LinkError::Io
    }
}

impl SerialLink for SerialPortLink {
    fn open(&mut self, settings: &SerialSettings) -> Result<(), LinkError> {
        if self.port.is_some() {
            return Ok(());
        }
        let data_bits = match settings.data_bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        };
        let parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        };
        let stop_bits = match settings.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        };

        let port = serialport::new(&self.device, settings.baud)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(FlowControl::None)
            .timeout(StdDuration::from_millis(settings.timeout_ms as u64))
            .open()
            .map_err(|e| {
                warn!("Failed to open serial port {}: {}", self.device, e);
                LinkError::Open
            })?;

        info!("Opened {} at {} baud", self.device, settings.baud);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.device);
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        self.port()?.write(data).map_err(map_io)
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        self.port()?.flush().map_err(map_io)
    }
}

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    fail_open: bool,
    /// Index of the write that comes back one byte short
    short_write_at: Option<usize>,
    writes: Vec<Vec<u8>>,
    parser: BusFrameParser,
    frames: Vec<ParsedBusFrame>,
    flushes: usize,
    opens: usize,
}

impl MockState {
    /// Decode accepted bytes as they arrive, like a panel on the bus would
    fn observe(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if let Ok(Some(frame)) = self.parser.feed(byte) {
                match frame.refresh() {
                    Some(mode) => trace!(
                        "Mock bus: {:?} frame for panel {}, {} bytes",
                        mode,
                        frame.address,
                        frame.data.len()
                    ),
                    None if frame.is_flush() => trace!("Mock bus: flush"),
                    None => trace!("Mock bus: command {:#04x}", frame.command),
                }
                self.frames.push(frame);
            }
        }
    }
}

/// In-memory link that records every write
///
/// Clones share the same capture, so a test can keep one clone while the
/// transport owns another.
#[derive(Clone)]
pub struct MockLink {
    state: Arc<Mutex<CriticalSectionRawMutex, RefCell<MockState>>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RefCell::new(MockState::default()))),
        }
    }

    /// A link whose `open` always fails
    pub fn failing_open() -> Self {
        let link = Self::new();
        link.with(|s| s.fail_open = true);
        link
    }

    /// Make write number `index` (0-based, counted from now) short by one byte
    pub fn short_write_at(&self, index: usize) {
        self.with(|s| s.short_write_at = Some(s.writes.len() + index));
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn is_open(&self) -> bool {
        self.with(|s| s.open)
    }

    /// Times `open` succeeded
    pub fn opens(&self) -> usize {
        self.with(|s| s.opens)
    }

    pub fn flushes(&self) -> usize {
        self.with(|s| s.flushes)
    }

    /// Each write call's bytes, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.with(|s| s.writes.clone())
    }

    /// Every byte written, concatenated
    pub fn captured(&self) -> Vec<u8> {
        self.with(|s| s.writes.concat())
    }

    /// Complete bus frames seen so far
    pub fn frames(&self) -> Vec<ParsedBusFrame> {
        self.with(|s| s.frames.clone())
    }

    /// Forget captured writes
    pub fn clear(&self) {
        self.with(|s| {
            s.writes.clear();
            s.frames.clear();
            s.parser = BusFrameParser::new();
            s.flushes = 0;
        });
    }
}

impl SerialLink for MockLink {
    fn open(&mut self, _settings: &SerialSettings) -> Result<(), LinkError> {
        self.with(|s| {
            if s.fail_open {
                return Err(LinkError::Open);
            }
            if !s.open {
                s.open = true;
                s.opens += 1;
            }
            Ok(())
        })
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.with(|s| s.open = false);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        self.with(|s| {
            if !s.open {
                return Err(LinkError::NotOpen);
            }
            let short = s.short_write_at == Some(s.writes.len());
            let accepted = if short {
                data.len().saturating_sub(1)
            } else {
                data.len()
            };
            s.writes.push(data[..accepted].to_vec());
            s.observe(&data[..accepted]);
            Ok(accepted)
        })
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        self.with(|s| {
            if !s.open {
                return Err(LinkError::NotOpen);
            }
            s.flushes += 1;
            Ok(())
        })
    }
}
