//! Configuration types
//!
//! Static panel topology and serial line settings. Both are produced once
//! by the host's config loader and stay read-only afterwards.

pub mod serial;
pub mod topology;

pub use serial::*;
pub use topology::*;
