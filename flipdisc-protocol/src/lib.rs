//! Flip-disc wire formats
//!
//! This crate defines every byte layout the display server speaks:
//!
//! - RBM, the 16-byte big-endian ingest header a producer prepends to a
//!   packed canvas bitmap
//! - FDIS, the little-endian frame used by richer remote producers
//! - The panel bus protocol written to the RS-485 line
//!
//! # Panel bus frame
//!
//! ```text
//! ┌───────┬─────────┬─────────┬─────────────┬─────┐
//! │ START │ COMMAND │ ADDRESS │ DATA        │ END │
//! │ 0x80  │ 1B      │ 1B      │ 0/7/14/28B  │ 0x8F│
//! └───────┴─────────┴─────────┴─────────────┴─────┘
//! ```
//!
//! The command byte encodes both the data width and whether the panel
//! applies the data at once or holds it until a flush. Everything here is
//! pure: no I/O, no clocks, no allocation.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod bits;
pub mod command;
pub mod error;
pub mod fdis;
pub mod frame;
pub mod rbm;

pub use bits::{fold_columns, stride};
pub use command::{command_byte, command_data_len, DataWidth, EncodeError, RefreshMode};
pub use error::DecodeError;
pub use fdis::FdisFrame;
pub use frame::{BusFrame, BusFrameParser, FrameError, ParsedBusFrame, BROADCAST_ADDRESS};
pub use rbm::{RbmHeader, RbmMessage};
