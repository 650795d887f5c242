//! Advisory buffer health classification

#[cfg(feature = "serde")]
use serde::Serialize;

/// Health bucket derived from buffer occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BufferHealth {
    /// More than 80% full
    Excellent,
    /// More than 50% full
    Good,
    /// More than 20% full
    Fair,
    /// Not empty
    Poor,
    /// Empty
    Critical,
}

impl BufferHealth {
    /// Classify an occupancy ratio
    pub fn from_level(level: f32) -> Self {
        if level > 0.8 {
            BufferHealth::Excellent
        } else if level > 0.5 {
            BufferHealth::Good
        } else if level > 0.2 {
            BufferHealth::Fair
        } else if level > 0.0 {
            BufferHealth::Poor
        } else {
            BufferHealth::Critical
        }
    }
}

/// Health metrics for the observability side
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HealthReport {
    pub health: BufferHealth,
    /// Queue length / capacity
    pub buffer_level: f32,
    /// Underruns per displayed frame
    pub underrun_rate: f32,
    /// Dropped frames per received frame
    pub drop_rate: f32,
    /// Available credits / max credits
    pub credits_ratio: f32,
}
