//! Flip-disc display server
//!
//! Host side of the pipeline: producers submit canvas bitmaps through
//! [`ingest`], the [`engine`] paces them out of the shared frame buffer and
//! the [`transport`] writes them to the RS-485 panel bus.

pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod link;
pub mod shared;
pub mod status;
pub mod tasks;
pub mod transport;

pub use config::ServerConfig;
pub use engine::{Engine, EngineMetrics, TickReport};
pub use error::{ConfigError, EngineError, IngestError, ServerError, TransportError};
pub use ingest::{Accepted, Ingest, RbmStreamParser};
pub use link::{DynLink, MockLink, SerialPortLink};
pub use shared::SharedFrameBuffer;
pub use status::StatusSnapshot;
pub use transport::{PanelWrite, Pause, RefreshPlan, TimerPause, Transport};
