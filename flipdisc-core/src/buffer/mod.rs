//! Credit-gated, paced frame buffer
//!
//! Decouples producer timing from display timing. Producers submit frames
//! whenever they like; the display loop asks [`FrameBuffer::display_frame_at_rate`]
//! once per tick and only gets a new frame when the previous one has been
//! on the panels for its full interval.

pub mod credits;
pub mod frame_buffer;
pub mod health;

pub use credits::CreditCounter;
pub use frame_buffer::{
    BufferConfig, BufferError, BufferStats, BufferStatus, EnqueueOutcome, FrameBuffer, Pacing,
    MAX_FPS,
};
pub use health::{BufferHealth, HealthReport};
