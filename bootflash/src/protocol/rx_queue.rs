//! Receive-side byte assembler.
//!
//! The read activity pushes whatever the transport delivers; sessions pull
//! exact-length slices (one frame at a time). Pulls block on a condition
//! variable signalled by `push` rather than polling.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

#[derive(Debug, Default)]
struct Buffer {
    data: Vec<u8>,
    cursor: usize,
}

impl Buffer {
    fn available(&self) -> usize {
        self.data.len() - self.cursor
    }

    fn take(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.available() < n {
            return None;
        }

        let out = self.data[self.cursor..self.cursor + n].to_vec();
        self.cursor += n;

        // Everything consumed: drop the backing storage so idle periods do
        // not accumulate memory.
        if self.cursor >= self.data.len() {
            self.data.clear();
            self.cursor = 0;
        }

        Some(out)
    }
}

/// Thread-safe receive queue shared between the read activity and sessions.
#[derive(Debug, Default)]
pub struct RxQueue {
    inner: Mutex<Buffer>,
    ready: Condvar,
}

impl RxQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append received bytes at the tail.
    pub fn push(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.lock()
            .data
            .extend_from_slice(bytes);
        self.ready.notify_all();
    }

    /// Take exactly `n` bytes if that many are buffered.
    ///
    /// `None` means "not enough data yet", not an error.
    pub fn try_take(&self, n: usize) -> Option<Vec<u8>> {
        self.lock().take(n)
    }

    /// Take exactly `n` bytes, waiting until `deadline` for them to arrive.
    pub fn take_until(&self, n: usize, deadline: Instant) -> Option<Vec<u8>> {
        let mut buf = self.lock();
        loop {
            if let Some(out) = buf.take(n) {
                return Some(out);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            buf = self
                .ready
                .wait_timeout(buf, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Number of buffered bytes not yet taken.
    pub fn available(&self) -> usize {
        self.lock().available()
    }

    /// Drop all buffered bytes.
    pub fn clear(&self) {
        let mut buf = self.lock();
        buf.data.clear();
        buf.cursor = 0;
    }
}
