//! Serial link connection state
//!
//! The transport's lifecycle is explicit, finite, and deterministic.

pub mod connection;

pub use connection::{ConnectionState, LinkEvent};
