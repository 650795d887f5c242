//! Tick deadline scheduling
//!
//! Each deadline is computed from the previous deadline, not from when the
//! previous tick finished, so variable write latency does not accumulate
//! into drift. A loop that falls more than one interval behind snaps to the
//! present instead of bursting to catch up.

use embassy_time::{Duration, Instant};

/// Interval actually waited between ticks
///
/// The configured frame gap is a floor on top of the frame interval.
pub fn effective_interval(frame_interval: Duration, frame_gap: Duration) -> Duration {
    frame_interval.max(frame_gap)
}

/// Deadline tracker for the display loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    deadline: Instant,
    frame_gap: Duration,
}

impl TickSchedule {
    /// First tick is due at `start`
    pub fn new(start: Instant, frame_gap: Duration) -> Self {
        Self {
            deadline: start,
            frame_gap,
        }
    }

    /// When the next tick is due
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn frame_gap(&self) -> Duration {
        self.frame_gap
    }

    /// Move to the next deadline after a tick
    ///
    /// `now` is when the tick finished and `frame_interval` the interval
    /// of the frame now on the panels. Returns the new deadline.
    pub fn advance(&mut self, now: Instant, frame_interval: Duration) -> Instant {
        let next = self.deadline + effective_interval(frame_interval, self.frame_gap);
        self.deadline = if next < now { now } else { next };
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(1_000 + ms)
    }

    #[test]
    fn test_gap_is_a_floor() {
        let interval = Duration::from_millis(33);
        assert_eq!(effective_interval(interval, Duration::from_millis(0)), interval);
        assert_eq!(
            effective_interval(interval, Duration::from_millis(50)),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_deadlines_do_not_drift() {
        let mut schedule = TickSchedule::new(at(0), Duration::from_millis(0));
        let interval = Duration::from_millis(100);
        // Writes finish at varying times inside each interval
        assert_eq!(schedule.advance(at(12), interval), at(100));
        assert_eq!(schedule.advance(at(170), interval), at(200));
        assert_eq!(schedule.advance(at(205), interval), at(300));
    }

    #[test]
    fn test_falls_behind_snaps_to_now() {
        let mut schedule = TickSchedule::new(at(0), Duration::from_millis(0));
        let interval = Duration::from_millis(100);
        assert_eq!(schedule.advance(at(350), interval), at(350));
        assert_eq!(schedule.advance(at(360), interval), at(450));
    }

    #[test]
    fn test_frame_gap_applies() {
        let mut schedule = TickSchedule::new(at(0), Duration::from_millis(80));
        assert_eq!(schedule.advance(at(1), Duration::from_millis(33)), at(80));
    }
}
