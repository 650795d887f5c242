//! Hardware abstraction traits
//!
//! These traits define the interface between the display pipeline and the
//! host-specific serial implementations.

pub mod link;

pub use link::{LinkError, SerialLink};
