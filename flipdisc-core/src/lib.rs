//! Transport-agnostic core of the flip-disc display server
//!
//! This crate contains all logic that does not touch a serial port or a
//! socket:
//!
//! - Panel topology and its validation
//! - Canvas storage and the canvas → panel mapper
//! - The credit-gated, paced frame buffer
//! - Tick deadline scheduling
//! - The connection state machine and the serial link trait
//!
//! Time is always passed in as an [`embassy_time::Instant`], so every
//! pacing decision can be driven by a deterministic clock in tests.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod buffer;
pub mod canvas;
pub mod config;
pub mod grid;
pub mod mapper;
pub mod scheduler;
pub mod state;
pub mod traits;

pub use buffer::{BufferConfig, BufferHealth, FrameBuffer, Pacing};
pub use canvas::{create_test_pattern, Canvas, Frame, TestPattern};
pub use config::{Orientation, PanelConfig, Topology, TopologyError};
pub use mapper::{MapError, PanelMapper, PanelPayload};
