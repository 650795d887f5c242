//! Inter-task communication channels
//!
//! The input reader thread pushes byte chunks into [`INGEST_CHANNEL`]; the
//! ingest task drains it. [`STOP`] ends the display loop.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

/// Largest chunk carried per channel message
pub const INGEST_CHUNK_SIZE: usize = 256;

/// Channel capacity for ingest chunks
const INGEST_CHANNEL_SIZE: usize = 16;

/// Raw input bytes
pub type IngestChunk = heapless::Vec<u8, INGEST_CHUNK_SIZE>;

/// Messages from the input reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    Data(IngestChunk),
    /// The input reached end of file
    End,
}

/// Input bytes from the reader thread
pub static INGEST_CHANNEL: Channel<CriticalSectionRawMutex, IngestEvent, INGEST_CHANNEL_SIZE> =
    Channel::new();

/// Signal the engine to finish its tick and shut down
pub static STOP: Signal<CriticalSectionRawMutex, ()> = Signal::new();
