//! Server error types

use flipdisc_core::traits::LinkError;
use flipdisc_core::{MapError, TopologyError};
use flipdisc_protocol::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors from the serial transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(LinkError),
    #[error("disconnect failed: {0}")]
    Disconnect(LinkError),
    #[error("transport not connected")]
    NotConnected,
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("write failed: {0}")]
    Write(LinkError),
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
}

/// Errors from the ingest boundary; each rejects one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("frame is {width}x{height}, canvas is {canvas_width}x{canvas_height}")]
    SizeMismatch {
        width: u16,
        height: u16,
        canvas_width: u16,
        canvas_height: u16,
    },
    #[error("bad canvas data: {0}")]
    Canvas(#[from] MapError),
}

/// Errors from the display engine's tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("mapping failed: {0}")]
    Map(#[from] MapError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing failed: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("config has neither [canvas]/[[panels]] nor [display]")]
    MissingLayout,
    #[error("incomplete explicit layout: {0}")]
    IncompleteLayout(&'static str),
    #[error("unknown panel type '{0}', expected 7x7, 14x7 or 28x7")]
    PanelType(String),
    #[error("invalid serial setting: {0}")]
    Serial(&'static str),
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("invalid runtime setting: {0}")]
    Runtime(&'static str),
}

/// Startup failures of the server binary
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("executor spawn failed: {0}")]
    Spawn(&'static str),
    #[error("input read failed: {0}")]
    Input(#[from] std::io::Error),
}
