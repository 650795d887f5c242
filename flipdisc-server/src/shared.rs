//! Frame buffer shared between ingest and the display engine

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use flipdisc_core::{BufferConfig, FrameBuffer};

/// A [`FrameBuffer`] behind a critical-section mutex
///
/// Every operation runs inside one short closure, so the queue and the credit
/// counter always move together and no lock is held across an await.
pub struct SharedFrameBuffer {
    inner: Mutex<CriticalSectionRawMutex, RefCell<FrameBuffer>>,
}

impl SharedFrameBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(FrameBuffer::new(config))),
        }
    }

    /// Run `f` with exclusive access to the buffer
    pub fn with<R>(&self, f: impl FnOnce(&mut FrameBuffer) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}
