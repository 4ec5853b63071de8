//! Per-phase pollable work runners.
//!
//! The active set is an index-stable slot vector: removal tombstones a
//! slot in place and compaction only happens between passes, so a poll
//! side effect can add or withdraw items without invalidating the
//! in-progress iteration.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, panic_message};
use crate::item::{PollItem, item_key};

/// Owns the active pollable work set for one phase.
///
/// Each tick, [`run`](PollRunner::run) polls every live slot exactly
/// once in insertion order and drops the ones that report completion.
/// Items added while a pass is in flight are not polled until the next
/// pass; items withdrawn mid-pass are never polled again.
#[derive(Default)]
pub struct PollRunner {
    state: Mutex<RunnerState>,
}

#[derive(Default)]
struct RunnerState {
    /// `None` marks a tombstoned slot awaiting compaction.
    slots: Vec<Option<Arc<dyn PollItem>>>,
}

impl PollRunner {
    /// Create an empty runner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item into the active set.
    ///
    /// Inserting the same item twice creates independent slots. An item
    /// whose status is already terminal is refused: a completed item is
    /// never polled again, re-insertion included.
    pub fn add_item(&self, item: Arc<dyn PollItem>) {
        if item.status().is_terminal() {
            tracing::trace!(key = item_key(&item), "refusing completed item");
            return;
        }
        self.state.lock().slots.push(Some(item));
    }

    /// Withdraw every slot holding `item`, identified by allocation.
    ///
    /// Safe to call mid-pass (including from another item's poll side
    /// effect): the slot is tombstoned in place and skipped for the
    /// rest of the pass and all subsequent ones.
    pub fn remove(&self, item: &Arc<dyn PollItem>) {
        let key = item_key(item);
        let mut removed = 0_usize;
        let mut state = self.state.lock();
        for slot in &mut state.slots {
            if slot.as_ref().is_some_and(|held| item_key(held) == key) {
                *slot = None;
                removed += 1;
            }
        }
        drop(state);
        if removed > 0 {
            tracing::trace!(key, removed, "withdrew item");
        }
    }

    /// Number of live items in the active set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Whether the active set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll every live slot once, in insertion order.
    ///
    /// The slot count is captured at pass start, so items inserted by a
    /// poll side effect wait for the next pass. The state lock is never
    /// held while a poll step runs, so a step can freely call
    /// [`add_item`](PollRunner::add_item) or
    /// [`remove`](PollRunner::remove) on this same runner.
    ///
    /// A panicking step is isolated to its slot: the item is dropped,
    /// every other item is still polled, and the collected failures are
    /// returned after the pass completes.
    pub fn run(&self) -> Result<(), Error> {
        let pass_len = self.state.lock().slots.len();
        let mut failures = Vec::new();

        for index in 0..pass_len {
            // `get` rather than indexing: a concurrent `clear` may have
            // shrunk the slot vector under us.
            let slot = self.state.lock().slots.get(index).and_then(Clone::clone);
            let Some(item) = slot else {
                continue;
            };

            // Duplicate slots share one allocation; once it completes,
            // later slots in the same pass must not step it again.
            if item.status().is_terminal() {
                self.tombstone(index);
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| item.poll_step())) {
                Ok(true) => {}
                Ok(false) => {
                    self.tombstone(index);
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(error = %message, "poll step panicked");
                    failures.push(message);
                    self.tombstone(index);
                }
            }
        }

        self.state.lock().slots.retain(Option::is_some);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::PollPanicked { failures })
        }
    }

    /// Drop all items without polling them.
    pub fn clear(&self) {
        self.state.lock().slots.clear();
    }

    fn tombstone(&self, index: usize) {
        if let Some(slot) = self.state.lock().slots.get_mut(index) {
            *slot = None;
        }
    }
}

impl fmt::Debug for PollRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollRunner")
            .field("active", &self.len())
            .finish()
    }
}
