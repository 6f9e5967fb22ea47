// src/router.rs

//! The Slot Router (§4.A): a 16384-cell lock-free table mapping slot number
//! to the `Entry` currently serving it. Grounded on the upstream-cluster
//! gateway's `Arc<ArcSwap<Vec<UpstreamNode>>>` routing table — one atomic
//! load per lookup, no lock ever taken on the hot path.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

use crate::registry::{Entry, Registry};
use crate::slot::NUM_SLOTS;

pub struct Router {
    cells: Box<[ArcSwapOption<Entry>]>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        let cells = (0..NUM_SLOTS)
            .map(|_| ArcSwapOption::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { cells }
    }

    /// Hot-path lookup: a single atomic load, no await, no lock.
    pub fn entry_for_slot(&self, slot: u16) -> Option<Arc<Entry>> {
        self.cells[slot as usize].load_full()
    }

    pub fn entry_for_key(&self, key: &[u8]) -> Option<Arc<Entry>> {
        self.entry_for_slot(crate::slot::calc_slot(key))
    }

    /// Points `slot` at `entry`, taking a reference for the new occupant
    /// before releasing whatever the cell previously held. Safe to call
    /// repeatedly with the same entry (a no-op refcount-wise beyond the
    /// first call for that slot).
    pub async fn install(&self, slot: u16, entry: Arc<Entry>, registry: &Registry) {
        entry.inc_ref();
        let prev = self.cells[slot as usize].swap(Some(entry.clone()));
        match prev {
            Some(prev) if !Arc::ptr_eq(&prev, &entry) => registry.release(&prev).await,
            Some(_) => {
                // Same entry was already installed here; undo the redundant
                // reference we just took.
                entry.dec_ref();
            }
            None => {}
        }
    }

    /// Removes whatever entry serves `slot`, releasing its reference.
    pub async fn evict(&self, slot: u16, registry: &Registry) {
        if let Some(prev) = self.cells[slot as usize].swap(None) {
            registry.release(&prev).await;
        }
    }

    /// Whether every slot currently has an owner (§8 full-coverage property).
    pub fn is_fully_covered(&self) -> bool {
        self.cells.iter().all(|c| c.load().is_some())
    }

    pub fn uncovered_count(&self) -> usize {
        self.cells.iter().filter(|c| c.load().is_none()).count()
    }
}
