//! Connection state machine
//!
//! ```text
//! Disconnected --ConnectRequested--> Connecting --Opened--> Connected
//!      ^                                 |                     |
//!      +------------OpenFailed-----------+                     |
//!      +----------------------Closed---------------------------+
//! ```

#[cfg(feature = "serde")]
use serde::Serialize;

/// Transport connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Device open in progress
    Connecting,
    /// Writes allowed
    Connected,
}

/// Events that drive the connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    /// `connect()` called
    ConnectRequested,
    /// Device opened
    Opened,
    /// Device failed to open
    OpenFailed,
    /// `disconnect()` called or device lost
    Closed,
}

impl ConnectionState {
    /// Check if writes are allowed
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: LinkEvent) -> Self {
        use ConnectionState::*;
        use LinkEvent::*;

        match (self, event) {
            (Disconnected, ConnectRequested) => Connecting,
            (Connecting, Opened) => Connected,
            (Connecting, OpenFailed) => Disconnected,
            (Connecting, Closed) => Disconnected,
            (Connected, Closed) => Disconnected,

            // Default: stay in current state
            _ => self,
        }
    }
}
