//! Single-slot retry timer.

use std::sync::{Mutex, MutexGuard};

use tokio::task::JoinHandle;

/// Holds at most one scheduled retry.
///
/// Each scheduled task carries the generation it was spawned with. A task
/// that fires calls [`RetryTimer::release`] before doing any work; if it no
/// longer owns the slot it must stop.
#[derive(Default)]
pub(crate) struct RetryTimer {
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl RetryTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // Slot state stays valid even if a holder panicked.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Abort the scheduled task, if any.
    pub(crate) fn cancel(&self) -> bool {
        let mut slot = self.slot();
        slot.generation = slot.generation.wrapping_add(1);
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Replace the scheduled task with the one `spawn` returns.
    ///
    /// `spawn` receives the generation the new task must pass to `release`.
    pub(crate) fn replace<F>(&self, spawn: F)
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        let mut slot = self.slot();
        if let Some(old) = slot.handle.take() {
            old.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        slot.handle = Some(spawn(generation));
    }

    /// Called by a firing task. Returns `false` if the task was superseded
    /// or cancelled in the meantime.
    pub(crate) fn release(&self, generation: u64) -> bool {
        let mut slot = self.slot();
        if slot.generation != generation {
            return false;
        }
        // detach, never abort: the caller is that task
        slot.handle.take();
        true
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.slot().handle.is_some()
    }
}
