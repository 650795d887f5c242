//! Serial transport for the panel bus
//!
//! The only component that touches the line. Two locks keep it safe under
//! concurrent callers:
//!
//! - the lifecycle lock owns the connection state and is held for a whole
//!   batch, so `disconnect()` waits for an in-flight batch to finish
//! - the write lock owns the link, so a batch (N panel frames plus the
//!   flush) is never interleaved with another caller's bytes
//!
//! # Refresh policy
//!
//! A batch of more than one panel is written with the buffered command
//! wherever the panel width supports it, followed by exactly one broadcast
//! flush so every panel flips at the same moment. A lone panel, and any
//! 7-byte panel, is written with the instant command.

use core::cell::Cell;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use heapless::Vec as HVec;
use log::{debug, info, trace, warn};
use serde::Serialize;

use flipdisc_core::config::SerialSettings;
use flipdisc_core::state::{ConnectionState, LinkEvent};
use flipdisc_core::traits::SerialLink;
use flipdisc_core::PanelPayload;
use flipdisc_protocol::frame::MAX_DATA_BYTES;
use flipdisc_protocol::{BusFrame, DataWidth, EncodeError, RefreshMode};

use crate::error::TransportError;

/// One panel's column bytes, addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelWrite {
    pub address: u8,
    pub data: HVec<u8, MAX_DATA_BYTES>,
}

impl PanelWrite {
    /// Column-fold a mapped payload
    pub fn from_payload(payload: &PanelPayload) -> Result<Self, EncodeError> {
        Ok(Self {
            address: payload.address,
            data: payload.column_bytes()?,
        })
    }
}

/// Refresh modes for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    /// Mode per panel, in batch order
    pub modes: Vec<RefreshMode>,
    /// Whether a flush frame follows the panels
    pub flush: bool,
}

impl RefreshPlan {
    /// Choose refresh modes for a batch
    ///
    /// Fails if any panel's data length has no command byte.
    pub fn for_batch(writes: &[PanelWrite]) -> Result<Self, EncodeError> {
        let multi = writes.len() > 1;
        let mut modes = Vec::with_capacity(writes.len());
        for write in writes {
            let width = DataWidth::from_len(write.data.len())?;
            modes.push(if multi && width.supports_buffered() {
                RefreshMode::Buffered
            } else {
                RefreshMode::Instant
            });
        }
        let flush = modes.contains(&RefreshMode::Buffered);
        Ok(Self { modes, flush })
    }
}

/// Encode a batch into wire frames, flush last if the plan needs one
pub fn encode_batch(writes: &[PanelWrite]) -> Result<Vec<BusFrame>, EncodeError> {
    let plan = RefreshPlan::for_batch(writes)?;
    let mut frames = Vec::with_capacity(writes.len() + 1);
    for (write, mode) in writes.iter().zip(plan.modes) {
        frames.push(BusFrame::panel(write.address, &write.data, mode)?);
    }
    if plan.flush {
        frames.push(BusFrame::flush());
    }
    Ok(frames)
}

/// Outcome of one successful batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Frames written, flush included
    pub frames: usize,
    pub bytes: usize,
    pub flushed: bool,
    /// Time spent holding the write lock
    pub elapsed: Duration,
}

/// Transport counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TransportStats {
    pub batches: u64,
    pub frames_written: u64,
    pub bytes_written: u64,
    pub short_writes: u64,
    pub write_errors: u64,
    pub last_write_us: u64,
}

/// Wait between consecutive frames of a batch
pub trait Pause {
    fn pause(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Inter-panel wait on the embassy time driver
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerPause;

impl Pause for TimerPause {
    async fn pause(&self, duration: Duration) {
        Timer::after(duration).await;
    }
}

/// Serial transport over a [`SerialLink`]
pub struct Transport<L, P = TimerPause> {
    settings: SerialSettings,
    interpanel: Duration,
    pause: P,
    lifecycle: Mutex<CriticalSectionRawMutex, ConnectionState>,
    link: Mutex<CriticalSectionRawMutex, L>,
    state_view: BlockingMutex<CriticalSectionRawMutex, Cell<ConnectionState>>,
    stats: BlockingMutex<CriticalSectionRawMutex, Cell<TransportStats>>,
}

impl<L: SerialLink> Transport<L> {
    /// Wrap a link; nothing is opened until [`Transport::connect`]
    pub fn new(link: L, settings: SerialSettings, interpanel: Duration) -> Self {
        Self::with_pause(link, settings, interpanel, TimerPause)
    }
}

impl<L: SerialLink, P: Pause> Transport<L, P> {
    /// Wrap a link with a custom inter-panel wait
    pub fn with_pause(link: L, settings: SerialSettings, interpanel: Duration, pause: P) -> Self {
        Self {
            settings,
            interpanel,
            pause,
            lifecycle: Mutex::new(ConnectionState::Disconnected),
            link: Mutex::new(link),
            state_view: BlockingMutex::new(Cell::new(ConnectionState::Disconnected)),
            stats: BlockingMutex::new(Cell::new(TransportStats::default())),
        }
    }

    /// Current connection state, without waiting on an in-flight batch
    pub fn state(&self) -> ConnectionState {
        self.state_view.lock(|s| s.get())
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.lock(|s| s.get())
    }

    fn apply(&self, state: &mut ConnectionState, event: LinkEvent) {
        *state = state.transition(event);
        self.state_view.lock(|s| s.set(*state));
    }

    fn record(&self, f: impl FnOnce(&mut TransportStats)) {
        self.stats.lock(|cell| {
            let mut stats = cell.get();
            f(&mut stats);
            cell.set(stats);
        });
    }

    /// Open the device
    ///
    /// Connecting while connected is a no-op. On failure the state stays
    /// `Disconnected`.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.lifecycle.lock().await;
        if state.is_connected() {
            return Ok(());
        }
        self.apply(&mut state, LinkEvent::ConnectRequested);

        let mut link = self.link.lock().await;
        match link.open(&self.settings) {
            Ok(()) => {
                self.apply(&mut state, LinkEvent::Opened);
                info!("Transport connected");
                Ok(())
            }
            Err(e) => {
                self.apply(&mut state, LinkEvent::OpenFailed);
                warn!("Transport connect failed: {}", e);
                Err(TransportError::Connect(e))
            }
        }
    }

    /// Close the device; idempotent
    ///
    /// Waits for any in-flight batch. The state ends `Disconnected` even if
    /// the driver reports an error while closing.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = self.lifecycle.lock().await;
        if *state == ConnectionState::Disconnected {
            return Ok(());
        }
        let mut link = self.link.lock().await;
        let result = link.close();
        self.apply(&mut state, LinkEvent::Closed);
        info!("Transport disconnected");
        result.map_err(TransportError::Disconnect)
    }

    /// Write one batch of panels, then flush if any were buffered
    ///
    /// Encoding happens before any byte is written. A short write aborts the
    /// rest of the batch and the flush is skipped.
    pub async fn send_batch(&self, writes: &[PanelWrite]) -> Result<BatchReport, TransportError> {
        let frames = encode_batch(writes)?;
        let flushed = frames.last().map_or(false, BusFrame::is_flush);

        let state = self.lifecycle.lock().await;
        if !state.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let mut link = self.link.lock().await;

        let started = Instant::now();
        let result = self.write_sequence(&mut *link, &frames).await;
        let elapsed = Instant::now().saturating_duration_since(started);
        drop(link);
        drop(state);

        match result {
            Ok(bytes) => {
                self.record(|s| {
                    s.batches += 1;
                    s.frames_written += frames.len() as u64;
                    s.bytes_written += bytes as u64;
                    s.last_write_us = elapsed.as_micros();
                });
                trace!("Wrote {} frames ({} bytes) in {}us", frames.len(), bytes, elapsed.as_micros());
                Ok(BatchReport {
                    frames: frames.len(),
                    bytes,
                    flushed,
                    elapsed,
                })
            }
            Err(e) => {
                self.record(|s| match e {
                    TransportError::ShortWrite { .. } => s.short_writes += 1,
                    _ => s.write_errors += 1,
                });
                warn!("Batch aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn write_sequence(&self, link: &mut L, frames: &[BusFrame]) -> Result<usize, TransportError> {
        let mut bytes = 0;
        for (i, frame) in frames.iter().enumerate() {
            if i > 0 && self.interpanel > Duration::from_ticks(0) {
                self.pause.pause(self.interpanel).await;
            }
            let expected = frame.len();
            let written = link.write(frame.as_bytes()).map_err(TransportError::Write)?;
            if written != expected {
                return Err(TransportError::ShortWrite { written, expected });
            }
            bytes += written;
        }
        link.flush().map_err(TransportError::Write)?;
        debug!("Batch of {} frames on the wire", frames.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MockLink;
    use embassy_futures::join::join;
    use embassy_futures::{block_on, yield_now};
    use flipdisc_protocol::command::{CMD_14_BUFFERED, CMD_28_BUFFERED, CMD_28_INSTANT, CMD_7_INSTANT, CMD_FLUSH};

    fn write(address: u8, len: usize, fill: u8) -> PanelWrite {
        let mut data = HVec::new();
        for _ in 0..len {
            data.push(fill).unwrap();
        }
        PanelWrite { address, data }
    }

    fn transport(link: MockLink) -> Transport<MockLink> {
        Transport::new(link, SerialSettings::default(), Duration::from_ticks(0))
    }

    /// Gives way to the other joined future instead of sleeping
    struct YieldPause;

    impl Pause for YieldPause {
        async fn pause(&self, _duration: Duration) {
            for _ in 0..3 {
                yield_now().await;
            }
        }
    }

    fn yielding(link: MockLink) -> Transport<MockLink, YieldPause> {
        Transport::with_pause(link, SerialSettings::default(), Duration::from_millis(1), YieldPause)
    }

    #[test]
    fn test_plan_single_panel_is_instant() {
        let plan = RefreshPlan::for_batch(&[write(0, 28, 0)]).unwrap();
        assert_eq!(plan.modes, vec![RefreshMode::Instant]);
        assert!(!plan.flush);
    }

    #[test]
    fn test_plan_multi_panel_is_buffered() {
        let plan = RefreshPlan::for_batch(&[write(0, 28, 0), write(1, 14, 0)]).unwrap();
        assert_eq!(plan.modes, vec![RefreshMode::Buffered, RefreshMode::Buffered]);
        assert!(plan.flush);
    }

    #[test]
    fn test_plan_seven_byte_panels_stay_instant() {
        let plan = RefreshPlan::for_batch(&[write(0, 7, 0), write(1, 7, 0)]).unwrap();
        assert_eq!(plan.modes, vec![RefreshMode::Instant, RefreshMode::Instant]);
        assert!(!plan.flush);
    }

    #[test]
    fn test_plan_rejects_unknown_width() {
        assert_eq!(
            RefreshPlan::for_batch(&[write(0, 10, 0)]),
            Err(EncodeError::UnsupportedDataWidth(10))
        );
    }

    #[test]
    fn test_send_requires_connection() {
        let t = transport(MockLink::new());
        assert_eq!(
            block_on(t.send_batch(&[write(0, 28, 0)])),
            Err(TransportError::NotConnected)
        );
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let t = transport(MockLink::failing_open());
        let result = block_on(t.connect());
        assert!(matches!(result, Err(TransportError::Connect(_))));
        assert_eq!(t.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_and_disconnect_are_idempotent() {
        let link = MockLink::new();
        let t = transport(link.clone());
        block_on(t.connect()).unwrap();
        block_on(t.connect()).unwrap();
        assert_eq!(t.state(), ConnectionState::Connected);
        assert_eq!(link.opens(), 1);

        block_on(t.disconnect()).unwrap();
        block_on(t.disconnect()).unwrap();
        assert_eq!(t.state(), ConnectionState::Disconnected);
        assert!(!link.is_open());
    }

    #[test]
    fn test_single_panel_wire_bytes() {
        let link = MockLink::new();
        let t = transport(link.clone());
        block_on(t.connect()).unwrap();

        let mut panel = write(0, 28, 0);
        panel.data[0] = 0x01;
        let report = block_on(t.send_batch(&[panel])).unwrap();
        assert!(!report.flushed);
        assert_eq!(report.bytes, 32);

        let mut expected = vec![0x80, CMD_28_INSTANT, 0x00, 0x01];
        expected.extend_from_slice(&[0; 27]);
        expected.push(0x8F);
        assert_eq!(link.captured(), expected);
        assert_eq!(link.flushes(), 1);
    }

    #[test]
    fn test_two_panels_then_one_flush() {
        let link = MockLink::new();
        let t = transport(link.clone());
        block_on(t.connect()).unwrap();
        block_on(t.send_batch(&[write(0, 28, 0x7F), write(1, 28, 0x7F)])).unwrap();

        let frames = link.frames();
        let commands: Vec<u8> = frames.iter().map(|f| f.command).collect();
        assert_eq!(commands, vec![CMD_28_BUFFERED, CMD_28_BUFFERED, CMD_FLUSH]);
        assert_eq!(link.writes().last().unwrap(), &vec![0x80, 0x82, 0xFF, 0x8F]);
        assert_eq!(t.stats().frames_written, 3);
    }

    #[test]
    fn test_mixed_widths() {
        let link = MockLink::new();
        let t = transport(link.clone());
        block_on(t.connect()).unwrap();
        block_on(t.send_batch(&[write(0, 7, 0), write(1, 14, 0)])).unwrap();
        let commands: Vec<u8> = link.frames().iter().map(|f| f.command).collect();
        assert_eq!(commands, vec![CMD_7_INSTANT, CMD_14_BUFFERED, CMD_FLUSH]);
    }

    #[test]
    fn test_short_write_aborts_batch_without_flush() {
        let link = MockLink::new();
        let t = transport(link.clone());
        block_on(t.connect()).unwrap();
        link.short_write_at(0);

        let result = block_on(t.send_batch(&[write(0, 28, 0), write(1, 28, 0)]));
        assert_eq!(
            result,
            Err(TransportError::ShortWrite {
                written: 31,
                expected: 32
            })
        );
        assert_eq!(link.writes().len(), 1);
        assert!(link.frames().iter().all(|f| f.command != CMD_FLUSH));
        assert_eq!(t.stats().short_writes, 1);
        // Still connected; the next tick may try again
        assert_eq!(t.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_encode_error_writes_nothing() {
        let link = MockLink::new();
        let t = transport(link.clone());
        block_on(t.connect()).unwrap();
        let result = block_on(t.send_batch(&[write(0, 28, 0), write(1, 10, 0)]));
        assert_eq!(
            result,
            Err(TransportError::Encode(EncodeError::UnsupportedDataWidth(10)))
        );
        assert!(link.captured().is_empty());
    }

    #[test]
    fn test_disconnect_waits_for_inflight_batch() {
        let link = MockLink::new();
        let t = yielding(link.clone());
        block_on(t.connect()).unwrap();

        let batch = [write(0, 28, 0), write(1, 28, 0)];
        let (sent, closed) = block_on(join(t.send_batch(&batch), t.disconnect()));
        assert!(sent.is_ok());
        assert!(closed.is_ok());
        // The batch finished, flush included, before the link closed
        assert_eq!(link.frames().len(), 3);
        assert_eq!(link.flushes(), 1);
        assert_eq!(t.state(), ConnectionState::Disconnected);
        assert!(!link.is_open());
    }

    #[test]
    fn test_send_after_disconnect_is_rejected() {
        let link = MockLink::new();
        let t = yielding(link.clone());
        block_on(t.connect()).unwrap();

        let batch = [write(0, 28, 0), write(1, 28, 0)];
        let (closed, sent) = block_on(join(t.disconnect(), t.send_batch(&batch)));
        assert!(closed.is_ok());
        assert_eq!(sent, Err(TransportError::NotConnected));
        assert!(link.captured().is_empty());
    }

    #[test]
    fn test_concurrent_batches_do_not_interleave() {
        let link = MockLink::new();
        let t = yielding(link.clone());
        block_on(t.connect()).unwrap();

        let a = [write(0, 28, 0), write(1, 28, 0)];
        let b = [write(2, 28, 0), write(3, 28, 0)];
        let (ra, rb) = block_on(join(t.send_batch(&a), t.send_batch(&b)));
        ra.unwrap();
        rb.unwrap();

        let addresses: Vec<u8> = link.frames().iter().map(|f| f.address).collect();
        assert_eq!(addresses, vec![0, 1, 0xFF, 2, 3, 0xFF]);
    }
}
