//! Frame queue, pacing clock and statistics
//!
//! Overflow policy is keep-latest: a full queue evicts its oldest frame to
//! admit a new one. Producers are never refused, so staleness is bounded by
//! the queue capacity instead of by producer behaviour.

use alloc::collections::VecDeque;
use core::fmt;

use embassy_time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::Serialize;

use super::credits::CreditCounter;
use super::health::{BufferHealth, HealthReport};
use crate::canvas::Frame;

/// Hardware ceiling on display rate
pub const MAX_FPS: u32 = 30;

/// Window over which the displayed frame rate is measured
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Buffer sizing and cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferConfig {
    /// Requested display rate; values above [`MAX_FPS`] are clamped for pacing
    pub target_fps: u32,
    /// How much display time the queue may hold, in ms
    pub buffer_duration_ms: u32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            buffer_duration_ms: 500,
        }
    }
}

impl BufferConfig {
    /// Queue slots: `round(target_fps × buffer_duration)`, at least 1
    pub fn max_buffer_size(&self) -> usize {
        let frames = (self.target_fps as u64 * self.buffer_duration_ms as u64 + 500) / 1000;
        (frames as usize).max(1)
    }
}

/// Buffer operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferError {
    /// Frame rate must be positive
    InvalidFps,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::InvalidFps => f.write_str("fps must be > 0"),
        }
    }
}

impl core::error::Error for BufferError {}

/// Result of an enqueue under keep-latest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EnqueueOutcome {
    /// Sequence number of the frame evicted to make room
    pub evicted: Option<u32>,
    /// Queue length after the enqueue
    pub len: usize,
}

/// Pacing decision for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pacing {
    /// The current frame's interval has not elapsed
    NotDue,
    /// Display this frame now
    Next(Frame),
    /// Due, but the queue is empty: keep showing the last output
    Fallback,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BufferStats {
    pub frames_received: u64,
    pub frames_displayed: u64,
    pub frames_dropped: u64,
    pub buffer_underruns: u64,
    pub credits_given: u64,
    /// Displayed frames per second over the last full window
    pub fps_actual: f32,
    /// Sequence number of the newest accepted frame
    pub last_seq: Option<u32>,
}

/// Point-in-time view of the buffer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BufferStatus {
    pub buffer_size: usize,
    pub max_buffer_size: usize,
    pub buffer_utilization: f32,
    pub credits_available: usize,
    pub target_fps: u32,
    pub frame_interval_ms: u64,
    /// Sequence number of the frame on the panels
    pub current_seq: Option<u32>,
    pub stats: BufferStats,
}

/// Bounded keep-latest frame queue with credits and pacing
#[derive(Debug)]
pub struct FrameBuffer {
    config: BufferConfig,
    queue: VecDeque<Frame>,
    capacity: usize,
    credits: CreditCounter,
    min_interval: Duration,
    default_interval: Duration,
    /// Interval of the frame currently displayed
    current_interval: Duration,
    last_display: Option<Instant>,
    current_seq: Option<u32>,
    stats: BufferStats,
    fps_window_start: Option<Instant>,
    fps_window_count: u32,
}

/// One frame period, rounded up so pacing never runs faster than `fps`
fn interval_for_fps(fps: u32) -> Duration {
    Duration::from_micros(1_000_000u64.div_ceil(fps.max(1) as u64))
}

impl FrameBuffer {
    pub fn new(config: BufferConfig) -> Self {
        let capacity = config.max_buffer_size();
        let min_interval = interval_for_fps(MAX_FPS);
        let default_interval = interval_for_fps(config.target_fps).max(min_interval);
        Self {
            config,
            queue: VecDeque::with_capacity(capacity),
            capacity,
            credits: CreditCounter::new(capacity),
            min_interval,
            default_interval,
            current_interval: default_interval,
            last_display: None,
            current_seq: None,
            stats: BufferStats::default(),
            fps_window_start: None,
            fps_window_count: 0,
        }
    }

    pub fn config(&self) -> BufferConfig {
        self.config
    }

    /// Queue slots (`max_buffer_size`)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Interval the displayed frame holds the panels for
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Display interval for a frame's requested duration
    ///
    /// Zero means the default cadence; anything else is clamped to the
    /// hardware minimum.
    pub fn interval_for(&self, duration_ms: u16) -> Duration {
        if duration_ms == 0 {
            self.default_interval
        } else {
            Duration::from_millis(duration_ms as u64).max(self.min_interval)
        }
    }

    /// Advisory wait before a producer should send again
    pub fn retry_after(&self) -> Duration {
        self.current_interval
    }

    /// Append a frame, evicting the oldest if the queue is full
    pub fn enqueue(&mut self, frame: Frame) -> EnqueueOutcome {
        let mut evicted = None;
        if self.queue.len() >= self.capacity {
            if let Some(old) = self.queue.pop_front() {
                self.stats.frames_dropped += 1;
                evicted = Some(old.seq);
            }
        }
        self.stats.frames_received += 1;
        self.stats.last_seq = Some(frame.seq);
        self.queue.push_back(frame);
        EnqueueOutcome {
            evicted,
            len: self.queue.len(),
        }
    }

    /// Producer path: spend a credit, then enqueue
    ///
    /// If the enqueue evicts a frame that was paid for, its credit is
    /// refunded, since it will never be retired by the display.
    pub fn submit(&mut self, frame: Frame) -> EnqueueOutcome {
        let paid = self.credits.consume();
        let outcome = self.enqueue(frame);
        if paid && outcome.evicted.is_some() {
            self.credits.add(1);
        }
        outcome
    }

    /// Pop the oldest frame, counting an underrun if there is none
    pub fn dequeue_for_display(&mut self) -> Option<Frame> {
        let frame = self.queue.pop_front();
        if frame.is_none() {
            self.stats.buffer_underruns += 1;
        }
        frame
    }

    /// Oldest queued frame, left in place
    pub fn peek_next(&self) -> Option<&Frame> {
        self.queue.front()
    }

    pub fn credits(&self) -> usize {
        self.credits.available()
    }

    pub fn consume_credit(&mut self) -> bool {
        self.credits.consume()
    }

    /// Return credits, capped at capacity; returns how many were added
    pub fn add_credits(&mut self, count: usize) -> usize {
        self.credits.add(count)
    }

    /// Whether the displayed frame's interval has elapsed at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_display {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .map_or(false, |elapsed| elapsed >= self.current_interval),
        }
    }

    /// Decide what the display should show at `now`
    ///
    /// A new frame comes out only once the previous frame's interval has
    /// elapsed. Retiring a frame returns one credit and arms the next
    /// interval from that frame's own duration.
    pub fn display_frame_at_rate(&mut self, now: Instant) -> Pacing {
        if !self.is_due(now) {
            return Pacing::NotDue;
        }

        match self.dequeue_for_display() {
            Some(frame) => {
                self.last_display = Some(now);
                self.current_interval = self.interval_for(frame.duration_ms);
                self.current_seq = Some(frame.seq);
                self.stats.frames_displayed += 1;
                self.update_fps_window(now);
                self.add_credits(1);
                Pacing::Next(frame)
            }
            None => Pacing::Fallback,
        }
    }

    fn update_fps_window(&mut self, now: Instant) {
        let start = *self.fps_window_start.get_or_insert(now);
        self.fps_window_count += 1;
        let elapsed = now.checked_duration_since(start).unwrap_or(Duration::from_ticks(0));
        if elapsed >= FPS_WINDOW {
            self.stats.fps_actual =
                self.fps_window_count as f32 * 1_000_000.0 / elapsed.as_micros() as f32;
            self.fps_window_start = Some(now);
            self.fps_window_count = 0;
        }
    }

    /// Drop every queued frame and refill credits; returns frames cleared
    pub fn clear(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        self.credits.reset();
        count
    }

    /// Change the display cadence
    ///
    /// Capacity is unchanged. The pacing clock is reset so the next frame
    /// is due immediately instead of after a long catch-up.
    pub fn set_target_fps(&mut self, fps: u32) -> Result<(), BufferError> {
        if fps == 0 {
            return Err(BufferError::InvalidFps);
        }
        self.config.target_fps = fps;
        self.default_interval = interval_for_fps(fps).max(self.min_interval);
        self.current_interval = self.default_interval;
        self.last_display = None;
        Ok(())
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            credits_given: self.credits.given(),
            ..self.stats
        }
    }

    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            buffer_size: self.queue.len(),
            max_buffer_size: self.capacity,
            buffer_utilization: self.level(),
            credits_available: self.credits.available(),
            target_fps: self.config.target_fps,
            frame_interval_ms: self.current_interval.as_millis(),
            current_seq: self.current_seq,
            stats: self.stats(),
        }
    }

    /// Queue length / capacity
    pub fn level(&self) -> f32 {
        self.queue.len() as f32 / self.capacity as f32
    }

    pub fn health(&self) -> HealthReport {
        let level = self.level();
        HealthReport {
            health: BufferHealth::from_level(level),
            buffer_level: level,
            underrun_rate: self.stats.buffer_underruns as f32
                / self.stats.frames_displayed.max(1) as f32,
            drop_rate: self.stats.frames_dropped as f32 / self.stats.frames_received.max(1) as f32,
            credits_ratio: self.credits.ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn frame(seq: u32) -> Frame {
        Frame::new(seq, Canvas::new(28, 7))
    }

    fn buffer(fps: u32, ms: u32) -> FrameBuffer {
        FrameBuffer::new(BufferConfig {
            target_fps: fps,
            buffer_duration_ms: ms,
        })
    }

    fn at(us: u64) -> Instant {
        Instant::from_micros(1_000_000 + us)
    }

    #[test]
    fn test_capacity_rounds() {
        assert_eq!(buffer(30, 500).capacity(), 15);
        assert_eq!(buffer(25, 500).capacity(), 13);
        assert_eq!(buffer(1, 100).capacity(), 1);
        assert_eq!(buffer(30, 500).credits(), 15);
    }

    #[test]
    fn test_intervals() {
        let buf = buffer(10, 500);
        assert_eq!(buf.default_interval(), Duration::from_millis(100));
        // Above the ceiling the hardware minimum wins
        let fast = buffer(120, 500);
        assert_eq!(fast.default_interval(), fast.min_interval());
        assert_eq!(fast.interval_for(5), fast.min_interval());
        assert_eq!(fast.interval_for(250), Duration::from_millis(250));
    }

    #[test]
    fn test_fifo_order() {
        let mut buf = buffer(30, 500);
        for seq in 0..3 {
            buf.enqueue(frame(seq));
        }
        assert_eq!(buf.peek_next().map(|f| f.seq), Some(0));
        let order: Vec<u32> = core::iter::from_fn(|| buf.dequeue_for_display())
            .map(|f| f.seq)
            .collect();
        assert_eq!(order, [0, 1, 2]);
        assert_eq!(buf.stats().buffer_underruns, 1);
    }

    #[test]
    fn test_keep_latest_evicts_oldest() {
        let mut buf = buffer(2, 1000);
        assert_eq!(buf.enqueue(frame(1)).evicted, None);
        assert_eq!(buf.enqueue(frame(2)).evicted, None);
        let outcome = buf.enqueue(frame(3));
        assert_eq!(outcome, EnqueueOutcome { evicted: Some(1), len: 2 });
        assert_eq!(buf.stats().frames_dropped, 1);
        assert_eq!(buf.stats().last_seq, Some(3));
    }

    #[test]
    fn test_submit_spends_and_display_returns_credit() {
        let mut buf = buffer(3, 1000);
        buf.submit(frame(1));
        buf.submit(frame(2));
        assert_eq!(buf.credits(), 1);

        assert!(matches!(buf.display_frame_at_rate(at(0)), Pacing::Next(f) if f.seq == 1));
        assert_eq!(buf.credits(), 2);
        assert_eq!(buf.stats().credits_given, 1);
    }

    #[test]
    fn test_submit_overflow_keeps_credit_invariant() {
        let mut buf = buffer(2, 1000);
        for seq in 0..10 {
            buf.submit(frame(seq));
            assert!(buf.credits() + buf.len() <= buf.capacity());
        }
        assert_eq!(buf.credits(), 0);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_pacing_respects_min_interval() {
        let mut buf = buffer(30, 500);
        buf.enqueue(frame(1));
        buf.enqueue(frame(2));

        assert!(matches!(buf.display_frame_at_rate(at(0)), Pacing::Next(f) if f.seq == 1));
        assert_eq!(buf.display_frame_at_rate(at(10_000)), Pacing::NotDue);
        // A full 1/30 s, not the truncated 33_333us
        assert_eq!(buf.display_frame_at_rate(at(33_333)), Pacing::NotDue);
        assert!(matches!(buf.display_frame_at_rate(at(33_334)), Pacing::Next(f) if f.seq == 2));
    }

    #[test]
    fn test_frame_interval_rounds_up() {
        assert_eq!(interval_for_fps(30), Duration::from_micros(33_334));
        assert_eq!(interval_for_fps(25), Duration::from_micros(40_000));
        assert_eq!(interval_for_fps(7), Duration::from_micros(142_858));
        let buf = buffer(30, 500);
        assert_eq!(buf.default_interval(), Duration::from_micros(33_334));
        assert_eq!(buf.min_interval(), Duration::from_micros(33_334));
    }

    #[test]
    fn test_per_frame_duration_sets_next_interval() {
        let mut buf = buffer(30, 500);
        buf.enqueue(frame(1).with_duration(200));
        buf.enqueue(frame(2));

        assert!(matches!(buf.display_frame_at_rate(at(0)), Pacing::Next(_)));
        assert_eq!(buf.current_interval(), Duration::from_millis(200));
        assert_eq!(buf.display_frame_at_rate(at(199_999)), Pacing::NotDue);
        assert!(matches!(buf.display_frame_at_rate(at(200_000)), Pacing::Next(f) if f.seq == 2));
    }

    #[test]
    fn test_short_duration_is_clamped() {
        let mut buf = buffer(30, 500);
        buf.enqueue(frame(1).with_duration(1));
        buf.enqueue(frame(2));
        buf.display_frame_at_rate(at(0));
        assert_eq!(buf.current_interval(), buf.min_interval());
        assert_eq!(buf.display_frame_at_rate(at(2_000)), Pacing::NotDue);
    }

    #[test]
    fn test_fallback_when_empty() {
        let mut buf = buffer(30, 500);
        assert_eq!(buf.display_frame_at_rate(at(0)), Pacing::Fallback);
        assert_eq!(buf.stats().buffer_underruns, 1);

        // A frame arriving after a fallback is shown on the next due tick
        buf.enqueue(frame(9));
        assert!(matches!(buf.display_frame_at_rate(at(1)), Pacing::Next(f) if f.seq == 9));
    }

    #[test]
    fn test_clock_going_backwards_is_not_due() {
        let mut buf = buffer(30, 500);
        buf.enqueue(frame(1));
        buf.enqueue(frame(2));
        buf.display_frame_at_rate(at(100_000));
        assert_eq!(buf.display_frame_at_rate(at(0)), Pacing::NotDue);
    }

    #[test]
    fn test_measured_fps() {
        let mut buf = buffer(10, 5000);
        for seq in 0..20 {
            buf.enqueue(frame(seq));
        }
        for i in 0..=10 {
            buf.display_frame_at_rate(at(i * 100_000));
        }
        let fps = buf.stats().fps_actual;
        assert!((fps - 11.0).abs() < 0.01, "fps = {}", fps);
    }

    #[test]
    fn test_clear_resets_credits() {
        let mut buf = buffer(30, 500);
        for seq in 0..5 {
            buf.submit(frame(seq));
        }
        assert_eq!(buf.credits(), 10);
        assert_eq!(buf.clear(), 5);
        assert!(buf.is_empty());
        assert_eq!(buf.credits(), 15);
    }

    #[test]
    fn test_set_target_fps() {
        let mut buf = buffer(30, 500);
        buf.enqueue(frame(1));
        buf.enqueue(frame(2));
        buf.display_frame_at_rate(at(0));

        assert_eq!(buf.set_target_fps(0), Err(BufferError::InvalidFps));
        buf.set_target_fps(5).unwrap();
        assert_eq!(buf.default_interval(), Duration::from_millis(200));
        assert_eq!(buf.capacity(), 15);
        // Pacing clock was reset
        assert!(buf.is_due(at(1)));
    }

    #[test]
    fn test_health_report() {
        let mut buf = buffer(10, 1000);
        assert_eq!(buf.health().health, BufferHealth::Critical);
        for seq in 0..9 {
            buf.submit(frame(seq));
        }
        let report = buf.health();
        assert_eq!(report.health, BufferHealth::Excellent);
        assert!((report.credits_ratio - 0.1).abs() < 1e-6);

        buf.enqueue(frame(9));
        buf.enqueue(frame(10));
        let report = buf.health();
        assert!((report.drop_rate - 1.0 / 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_status_snapshot() {
        let mut buf = buffer(30, 500);
        buf.submit(frame(4));
        buf.display_frame_at_rate(at(0));
        let status = buf.status();
        assert_eq!(status.buffer_size, 0);
        assert_eq!(status.max_buffer_size, 15);
        assert_eq!(status.current_seq, Some(4));
        assert_eq!(status.frame_interval_ms, 33);
        assert_eq!(status.stats.frames_displayed, 1);
    }

    proptest! {
        #[test]
        fn prop_keep_latest_keeps_newest_in_order(cap_frames in 1u32..20, extra in 0u32..40) {
            let mut buf = buffer(cap_frames, 1000);
            let cap = buf.capacity() as u32;
            for seq in 0..cap + extra {
                buf.enqueue(frame(seq));
            }
            let kept: Vec<u32> = core::iter::from_fn(|| buf.dequeue_for_display())
                .map(|f| f.seq)
                .collect();
            let expected: Vec<u32> = (extra..cap + extra).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn prop_credits_bounded_under_submit_and_display(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let mut buf = buffer(30, 200);
            let mut t = 0u64;
            for (seq, submit) in ops.into_iter().enumerate() {
                if submit {
                    buf.submit(frame(seq as u32));
                } else {
                    t += 40_000;
                    buf.display_frame_at_rate(at(t));
                }
                prop_assert!(buf.credits() <= buf.capacity());
                prop_assert!(buf.len() <= buf.capacity());
            }
        }
    }
}
