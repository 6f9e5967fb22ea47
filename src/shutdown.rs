// src/shutdown.rs

//! The shutdown latch (§4.G, §5): a drain counter the monitor acquires before
//! any network call within a tick, so that shutdown can wait for in-flight
//! ticks to finish before tearing down entries.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Debug)]
pub struct ShutdownLatch {
    count: AtomicUsize,
    shutting_down: AtomicBool,
    drained: Notify,
}

impl Default for ShutdownLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            drained: Notify::new(),
        }
    }

    /// Attempts to acquire the latch. Returns `None` once shutdown has
    /// started, in which case the caller must abort its tick silently.
    pub fn acquire(&self) -> Option<ShutdownGuard<'_>> {
        if self.shutting_down.load(Ordering::Acquire) {
            return None;
        }
        self.count.fetch_add(1, Ordering::AcqRel);
        if self.shutting_down.load(Ordering::Acquire) {
            // Shutdown raced us after the load above; release immediately so
            // it isn't left waiting on a permit nobody will use.
            if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.drained.notify_waiters();
            }
            return None;
        }
        Some(ShutdownGuard { latch: self })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Marks shutdown as started (refusing any further `acquire`) and waits
    /// for every currently-held guard to drop.
    pub async fn begin_drain(&self) {
        self.shutting_down.store(true, Ordering::Release);
        while self.count.load(Ordering::Acquire) > 0 {
            self.drained.notified().await;
        }
    }
}

pub struct ShutdownGuard<'a> {
    latch: &'a ShutdownLatch,
}

impl Drop for ShutdownGuard<'_> {
    fn drop(&mut self) {
        if self.latch.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.latch.drained.notify_waiters();
        }
    }
}
