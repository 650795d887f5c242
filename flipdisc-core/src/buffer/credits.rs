//! Credit counter
//!
//! A credit is one frame of buffer headroom. Producers spend a credit per
//! submitted frame; the display path hands one back each time a frame is
//! retired. The count is clamped to `[0, max]`.

/// Bounded credit counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CreditCounter {
    available: usize,
    max: usize,
    /// Total credits handed back over the counter's lifetime
    given: u64,
}

impl CreditCounter {
    /// Counter starting full
    pub fn new(max: usize) -> Self {
        Self {
            available: max,
            max,
            given: 0,
        }
    }

    pub fn available(&self) -> usize {
        self.available
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn given(&self) -> u64 {
        self.given
    }

    /// Take one credit; `false` if none are left
    pub fn consume(&mut self) -> bool {
        if self.available > 0 {
            self.available -= 1;
            true
        } else {
            false
        }
    }

    /// Return up to `count` credits, returning how many actually fit
    pub fn add(&mut self, count: usize) -> usize {
        let before = self.available;
        self.available = self.available.saturating_add(count).min(self.max);
        let added = self.available - before;
        self.given += added as u64;
        added
    }

    /// Refill to max
    pub fn reset(&mut self) {
        self.available = self.max;
    }

    /// Fraction of credits available, 0.0–1.0
    pub fn ratio(&self) -> f32 {
        if self.max == 0 {
            0.0
        } else {
            self.available as f32 / self.max as f32
        }
    }
}
