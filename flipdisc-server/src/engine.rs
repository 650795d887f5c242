//! Display engine
//!
//! Once per tick: ask the frame buffer whether a frame is due, map it onto
//! the panels, column-fold each payload and hand the batch to the transport.
//! When the buffer has nothing due but the interval has elapsed, the last
//! output is sent again so the panels never go blank.
//!
//! Ticks are stamped with their scheduled deadline rather than the time the
//! timer actually fired, so pacing stays on the deadline grid regardless of
//! wake-up jitter or write latency.

use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use log::{debug, info, trace, warn};
use serde::Serialize;

use flipdisc_core::scheduler::TickSchedule;
use flipdisc_core::traits::SerialLink;
use flipdisc_core::{Canvas, PanelMapper, Pacing};

use crate::error::{EngineError, TransportError};
use crate::shared::SharedFrameBuffer;
use crate::transport::{BatchReport, PanelWrite, Transport};

/// Engine counters, readable while the engine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngineStats {
    pub ticks: u64,
    pub frames_displayed: u64,
    pub repeats: u64,
    pub errors: u64,
    /// Duration of the last transport batch
    pub last_write_us: u64,
    /// Time between the last two ticks
    pub last_interval_us: u64,
    pub last_seq: Option<u32>,
}

/// Shared cell the engine publishes its counters into
pub struct EngineMetrics {
    inner: BlockingMutex<CriticalSectionRawMutex, Cell<EngineStats>>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            inner: BlockingMutex::new(Cell::new(EngineStats::default())),
        }
    }

    pub fn snapshot(&self) -> EngineStats {
        self.inner.lock(|s| s.get())
    }

    fn update(&self, f: impl FnOnce(&mut EngineStats)) {
        self.inner.lock(|cell| {
            let mut stats = cell.get();
            f(&mut stats);
            cell.set(stats);
        });
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// The displayed frame's interval has not elapsed
    NotDue,
    /// A new frame went out
    Displayed { seq: u32, batch: BatchReport },
    /// Buffer empty; the last output was sent again
    Repeated { batch: BatchReport },
    /// Buffer empty and nothing has been displayed yet
    Idle,
    /// Mapping or transmission failed; the loop carries on
    Failed { seq: Option<u32>, error: EngineError },
}

/// The display loop
pub struct Engine<'a, L> {
    buffer: &'a SharedFrameBuffer,
    transport: &'a Transport<L>,
    metrics: &'a EngineMetrics,
    mapper: PanelMapper,
    frame_gap: Duration,
    last_output: Option<Vec<PanelWrite>>,
    last_tick: Option<Instant>,
    failing: bool,
}

impl<'a, L: SerialLink> Engine<'a, L> {
    pub fn new(
        buffer: &'a SharedFrameBuffer,
        transport: &'a Transport<L>,
        metrics: &'a EngineMetrics,
        mapper: PanelMapper,
        frame_gap: Duration,
    ) -> Self {
        Self {
            buffer,
            transport,
            metrics,
            mapper,
            frame_gap,
            last_output: None,
            last_tick: None,
            failing: false,
        }
    }

    /// Map and fold a canvas into one write per panel
    pub fn prepare(&self, canvas: &Canvas) -> Result<Vec<PanelWrite>, EngineError> {
        let payloads = self.mapper.map(canvas)?;
        let mut writes = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            writes.push(PanelWrite::from_payload(payload).map_err(TransportError::from)?);
        }
        Ok(writes)
    }

    /// Run one tick at `now`
    pub async fn tick(&mut self, now: Instant) -> TickReport {
        let interval = self
            .last_tick
            .replace(now)
            .and_then(|prev| now.checked_duration_since(prev));
        self.metrics.update(|s| {
            s.ticks += 1;
            if let Some(interval) = interval {
                s.last_interval_us = interval.as_micros();
            }
        });

        let report = match self.buffer.with(|fb| fb.display_frame_at_rate(now)) {
            Pacing::NotDue => TickReport::NotDue,
            Pacing::Next(frame) => self.display(frame.seq, &frame.canvas).await,
            Pacing::Fallback => self.repeat().await,
        };
        self.note(&report);
        report
    }

    async fn display(&mut self, seq: u32, canvas: &Canvas) -> TickReport {
        let writes = match self.prepare(canvas) {
            Ok(writes) => writes,
            Err(error) => {
                return TickReport::Failed {
                    seq: Some(seq),
                    error,
                }
            }
        };
        let result = self.transport.send_batch(&writes).await;
        // Even after a failed write this is what the panels should show
        self.last_output = Some(writes);
        self.metrics.update(|s| s.last_seq = Some(seq));
        match result {
            Ok(batch) => TickReport::Displayed { seq, batch },
            Err(e) => TickReport::Failed {
                seq: Some(seq),
                error: e.into(),
            },
        }
    }

    async fn repeat(&mut self) -> TickReport {
        let Some(writes) = self.last_output.as_deref() else {
            return TickReport::Idle;
        };
        match self.transport.send_batch(writes).await {
            Ok(batch) => TickReport::Repeated { batch },
            Err(e) => TickReport::Failed {
                seq: None,
                error: e.into(),
            },
        }
    }

    fn note(&mut self, report: &TickReport) {
        match report {
            TickReport::Displayed { seq, batch } => {
                trace!("Displayed frame {} ({} frames on the bus)", seq, batch.frames);
                self.metrics.update(|s| {
                    s.frames_displayed += 1;
                    s.last_write_us = batch.elapsed.as_micros();
                });
            }
            TickReport::Repeated { batch } => {
                self.metrics.update(|s| {
                    s.repeats += 1;
                    s.last_write_us = batch.elapsed.as_micros();
                });
            }
            TickReport::Failed { error, .. } => {
                self.metrics.update(|s| s.errors += 1);
                if !self.failing {
                    warn!("Tick failed: {}", error);
                } else {
                    debug!("Tick failed: {}", error);
                }
            }
            TickReport::NotDue | TickReport::Idle => {}
        }
        let failing = matches!(report, TickReport::Failed { .. });
        if self.failing && !failing && *report != TickReport::NotDue {
            info!("Display output recovered");
        }
        if *report != TickReport::NotDue {
            self.failing = failing;
        }
    }

    /// Tick on the deadline grid until `stop` is signalled
    ///
    /// A tick in progress is always finished. On stop the transport is
    /// disconnected best-effort.
    pub async fn run(&mut self, stop: &Signal<CriticalSectionRawMutex, ()>) {
        let mut schedule = TickSchedule::new(Instant::now(), self.frame_gap);
        loop {
            // Stop is polled first so a loop running behind still sees it
            if let Either::First(()) = select(stop.wait(), Timer::at(schedule.deadline())).await {
                break;
            }
            self.tick(schedule.deadline()).await;
            let interval = self.buffer.with(|fb| fb.current_interval());
            schedule.advance(Instant::now(), interval);
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!("Disconnect on stop failed: {}", e);
        }
        info!("Engine stopped");
    }
}
