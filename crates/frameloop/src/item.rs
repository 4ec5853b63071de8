//! Pollable work items.
//!
//! A work item is the only polymorphic entity in the scheduler core:
//! timers, signal waiters and chained continuations all implement the
//! same single-step trait and are driven identically by the per-phase
//! runner.

use std::sync::Arc;

/// Completion state of a work item, as observed by diagnostics.
///
/// The runner only distinguishes "more steps remain" from "done"; the
/// finer-grained outcome exists for registry snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    /// Still has steps remaining.
    Pending,
    /// Completed with a result.
    Succeeded,
    /// Completed with a failure.
    Faulted,
    /// Completed early by cancellation.
    Canceled,
}

impl ItemStatus {
    /// Whether the item has finished (in any way).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A unit of asynchronous work advanced one step at a time.
///
/// Items are shared (`Arc`) between whoever awaits their result and the
/// runner that steps them, so stepping takes `&self`; implementations
/// keep their mutable state behind interior mutability. The runner is
/// the only caller of [`poll_step`](PollItem::poll_step) - exactly once
/// per tick while the item is registered.
pub trait PollItem: Send + Sync + 'static {
    /// Advance one step. Returns `true` while more steps remain; once
    /// this returns `false` the runner releases the item and never
    /// polls it again. Cancellation is expressed by returning `false`
    /// early (with [`status`](PollItem::status) reporting
    /// [`ItemStatus::Canceled`]).
    fn poll_step(&self) -> bool;

    /// Current completion state, queryable at any time from any thread.
    fn status(&self) -> ItemStatus;
}

/// Identity key for a work item: the address of its shared allocation.
pub(crate) fn item_key(item: &Arc<dyn PollItem>) -> usize {
    Arc::as_ptr(item).cast::<()>() as usize
}
