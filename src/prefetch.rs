use std::ops::Range;
use std::sync::Arc;

use crate::error::Result;
use crate::loader::{LoadMode, Loader};
use crate::slots::{Slot, SlotState, Store};

/// Indices warmed after showing `current`: `[current + 1, min(current + size, count))`.
pub fn prefetch_window(current: usize, size: usize, count: usize) -> Range<usize> {
    let start = current + 1;
    let end = current.saturating_add(size).min(count);
    start..end.max(start)
}

/// Clears the slot's queued flag even if the load unwinds.
struct QueuedGuard<'a>(&'a Slot);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.clear_queued();
    }
}

// ---------------------------------------------------------------------------
// Prefetcher
// ---------------------------------------------------------------------------

/// Submits opportunistic loads for the forward window to a bounded pool.
///
/// Tasks are never cancelled. A task left over from an earlier window (or an
/// earlier directory) runs to completion and the loader decides whether its
/// result is kept.
pub struct Prefetcher {
    pool: rayon::ThreadPool,
    window: usize,
}

impl Prefetcher {
    pub fn new(workers: usize, window: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("prefetch-{}", i))
            .panic_handler(|_| log::error!("prefetch task panicked"))
            .build()?;
        Ok(Self { pool, window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue loads for the window after `current`. Slots that are already
    /// decoded, failed, or queued are skipped. Returns the submitted indices.
    pub fn schedule(&self, store: &Arc<Store>, loader: &Arc<Loader>, current: usize) -> Vec<usize> {
        let mut submitted = Vec::new();
        for idx in prefetch_window(current, self.window, store.len()) {
            let slot = store.get(idx);
            if slot.state() != SlotState::Empty || !slot.mark_queued() {
                continue;
            }
            let store = Arc::clone(store);
            let loader = Arc::clone(loader);
            self.pool.spawn(move || {
                let slot = store.get(idx);
                let _queued = QueuedGuard(slot);
                let outcome = loader.load(&store, idx, LoadMode::Opportunistic);
                log::trace!("prefetch {} -> {:?}", slot.index(), outcome);
            });
            submitted.push(idx);
        }
        if !submitted.is_empty() {
            log::debug!("[prefetch] from {} queued {:?}", current, submitted);
        }
        submitted
    }
}
