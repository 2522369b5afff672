use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::traits::{LinkKind, Transport};

/// In-memory transport that records every write.
///
/// Useful for demo connections and for driving the engine in tests: writes
/// can be made to fail on demand to exercise the write-failure path.
pub struct MemoryTransport {
    link: LinkKind,
    writes: Mutex<Vec<Bytes>>,
    failing: AtomicBool,
    fail_next: AtomicUsize,
}

impl MemoryTransport {
    /// Create a recording transport for the given link kind.
    pub fn new(link: LinkKind) -> Self {
        Self {
            link,
            writes: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Snapshot of all recorded writes, oldest first.
    pub fn writes(&self) -> Vec<Bytes> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the recorded writes.
    pub fn take_writes(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.writes.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of recorded writes.
    pub fn write_count(&self) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Transport for MemoryTransport {
    fn link_kind(&self) -> LinkKind {
        self.link
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.should_fail() {
            return Err(TransportError::WriteRejected(bytes.len()));
        }
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Bytes::copy_from_slice(bytes));
        Ok(())
    }
}
