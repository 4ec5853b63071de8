//! Live-task registry: weak tracking of in-flight pollable work.
//!
//! The registry never owns the items it observes. Entries are keyed by
//! the item's allocation address and hold only a `Weak`, so tracking a
//! work item can never extend its lifetime or leak it; entries whose
//! item has been dropped are excluded from snapshots lazily and pruned
//! on the way.

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::item::{ItemStatus, PollItem, item_key};

/// Metadata supplied when a work item is tracked.
#[derive(Debug, Clone, Default)]
pub struct TrackDescriptor {
    /// Display name for inspectors.
    pub name: String,
    /// Optional capture trace. When `None` and trace capture is on,
    /// the registry records a backtrace of the `track` call instead.
    pub trace: Option<String>,
}

impl TrackDescriptor {
    /// Descriptor with just a display name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trace: None,
        }
    }
}

/// One row of a registry snapshot.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Monotonic sequence id assigned at track time.
    pub sequence: u64,
    /// Display name from the descriptor.
    pub name: String,
    /// Status queried live from the item at snapshot time.
    pub status: ItemStatus,
    /// When the item was tracked.
    pub created_at: SystemTime,
    /// Capture trace, if any was recorded.
    pub trace: Option<String>,
}

struct Entry {
    item: Weak<dyn PollItem>,
    name: String,
    sequence: u64,
    created_at: SystemTime,
    trace: Option<String>,
}

/// Non-owning registry of live pollable work items.
///
/// Producers call [`track`](TaskRegistry::track) /
/// [`untrack`](TaskRegistry::untrack) from any thread; an inspector
/// polls [`check_and_reset_dirty`](TaskRegistry::check_and_reset_dirty)
/// cheaply and re-enumerates with
/// [`for_each_active`](TaskRegistry::for_each_active) only when
/// something changed.
pub struct TaskRegistry {
    enabled: AtomicBool,
    capture_traces: AtomicBool,
    dirty: AtomicBool,
    next_sequence: AtomicU64,
    entries: Mutex<FxHashMap<usize, Entry>>,
    /// Reused across snapshots to avoid a per-call allocation; locked
    /// only while materializing, never while the visitor runs.
    scratch: Mutex<Vec<TaskSnapshot>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// Create a registry with tracking enabled and trace capture off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            capture_traces: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            next_sequence: AtomicU64::new(1),
            entries: Mutex::new(FxHashMap::default()),
            scratch: Mutex::new(Vec::new()),
        }
    }

    /// Toggle tracking. While disabled, `track` is a complete no-op.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether tracking is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Toggle backtrace capture for descriptors without a trace.
    pub fn set_capture_traces(&self, capture: bool) {
        self.capture_traces.store(capture, Ordering::Relaxed);
    }

    /// Record metadata for `item`. No-op while tracking is disabled.
    ///
    /// Tracking never takes a strong reference: if every other owner of
    /// the item drops it, the entry dies with it.
    pub fn track(&self, item: &Arc<dyn PollItem>, descriptor: TrackDescriptor) {
        if !self.is_enabled() {
            return;
        }

        let trace = descriptor.trace.or_else(|| {
            self.capture_traces
                .load(Ordering::Relaxed)
                .then(|| Backtrace::force_capture().to_string())
        });
        let entry = Entry {
            item: Arc::downgrade(item),
            name: descriptor.name,
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            created_at: SystemTime::now(),
            trace,
        };

        self.entries.lock().insert(item_key(item), entry);
        self.dirty.store(true, Ordering::Release);
    }

    /// Remove the entry for `item`, if present.
    ///
    /// Safe to call for an item that was never tracked (or was tracked
    /// while the registry was disabled); that is a silent no-op.
    pub fn untrack(&self, item: &Arc<dyn PollItem>) {
        if self.entries.lock().remove(&item_key(item)).is_some() {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Number of entries, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entries are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Visit a point-in-time snapshot of the live entries, ordered by
    /// sequence id.
    ///
    /// The snapshot is materialized first (entries whose item has been
    /// dropped are skipped and pruned), then the visitor runs with no
    /// registry lock held, so a slow visitor cannot block producers.
    /// Each row's status is queried from the item at snapshot time, not
    /// cached.
    pub fn for_each_active(&self, mut visitor: impl FnMut(&TaskSnapshot)) {
        let mut rows = std::mem::take(&mut *self.scratch.lock());
        rows.clear();

        self.entries.lock().retain(|_, entry| {
            let Some(item) = entry.item.upgrade() else {
                return false;
            };
            rows.push(TaskSnapshot {
                sequence: entry.sequence,
                name: entry.name.clone(),
                status: item.status(),
                created_at: entry.created_at,
                trace: entry.trace.clone(),
            });
            true
        });
        rows.sort_unstable_by_key(|row| row.sequence);

        for row in &rows {
            visitor(row);
        }

        *self.scratch.lock() = rows;
    }

    /// Atomically read and clear the dirty flag.
    ///
    /// Returns `true` exactly once per batch of mutations since the
    /// last call.
    pub fn check_and_reset_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Drop every entry. Used on scheduler teardown.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            entries.clear();
            self.dirty.store(true, Ordering::Release);
        }
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("entries", &self.len())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Stub {
        status: Mutex<ItemStatus>,
    }

    impl Stub {
        fn pending() -> Arc<dyn PollItem> {
            Arc::new(Self {
                status: Mutex::new(ItemStatus::Pending),
            })
        }
    }

    impl PollItem for Stub {
        fn poll_step(&self) -> bool {
            false
        }

        fn status(&self) -> ItemStatus {
            *self.status.lock()
        }
    }

    fn snapshot(registry: &TaskRegistry) -> Vec<TaskSnapshot> {
        let mut rows = Vec::new();
        registry.for_each_active(|row| rows.push(row.clone()));
        rows
    }

    #[test]
    fn test_track_then_snapshot() {
        let registry = TaskRegistry::new();
        let item = Stub::pending();

        registry.track(&item, TrackDescriptor::named("delay"));

        let rows = snapshot(&registry);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "delay");
        assert_eq!(rows[0].status, ItemStatus::Pending);
        assert!(rows[0].trace.is_none());
    }

    #[test]
    fn test_untrack_removes_entry() {
        let registry = TaskRegistry::new();
        let item = Stub::pending();

        registry.track(&item, TrackDescriptor::named("delay"));
        registry.untrack(&item);
        assert!(snapshot(&registry).is_empty());

        // Untracking again (or an unknown item) is a silent no-op.
        registry.untrack(&item);
        registry.untrack(&Stub::pending());
    }

    #[test]
    fn test_dropped_item_excluded_lazily() {
        let registry = TaskRegistry::new();
        let item = Stub::pending();

        registry.track(&item, TrackDescriptor::named("leaky"));
        assert_eq!(registry.len(), 1);

        drop(item);
        // The entry is still present until the next snapshot prunes it.
        assert_eq!(registry.len(), 1);
        assert!(snapshot(&registry).is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_status_queried_at_snapshot_time() {
        let registry = TaskRegistry::new();
        let stub = Arc::new(Stub {
            status: Mutex::new(ItemStatus::Pending),
        });
        let item: Arc<dyn PollItem> = Arc::clone(&stub) as Arc<dyn PollItem>;

        registry.track(&item, TrackDescriptor::named("job"));
        assert_eq!(snapshot(&registry)[0].status, ItemStatus::Pending);

        *stub.status.lock() = ItemStatus::Faulted;
        assert_eq!(snapshot(&registry)[0].status, ItemStatus::Faulted);
    }

    #[test]
    fn test_snapshot_ordered_by_sequence() {
        let registry = TaskRegistry::new();
        let first = Stub::pending();
        let second = Stub::pending();

        registry.track(&first, TrackDescriptor::named("first"));
        registry.track(&second, TrackDescriptor::named("second"));

        let rows = snapshot(&registry);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].sequence < rows[1].sequence);
        assert_eq!(rows[0].name, "first");
        assert_eq!(rows[1].name, "second");
    }

    #[test]
    fn test_dirty_flag_once_per_batch() {
        let registry = TaskRegistry::new();
        assert!(!registry.check_and_reset_dirty());

        let a = Stub::pending();
        let b = Stub::pending();
        registry.track(&a, TrackDescriptor::named("a"));
        registry.track(&b, TrackDescriptor::named("b"));

        assert!(registry.check_and_reset_dirty());
        assert!(!registry.check_and_reset_dirty());

        registry.untrack(&a);
        assert!(registry.check_and_reset_dirty());
        assert!(!registry.check_and_reset_dirty());
    }

    #[test]
    fn test_disabled_registry_is_a_no_op() {
        let registry = TaskRegistry::new();
        registry.set_enabled(false);

        let item = Stub::pending();
        registry.track(&item, TrackDescriptor::named("ghost"));

        assert!(snapshot(&registry).is_empty());
        assert!(!registry.check_and_reset_dirty());
    }

    #[test]
    fn test_trace_capture() {
        let registry = TaskRegistry::new();
        registry.set_capture_traces(true);

        let item = Stub::pending();
        registry.track(&item, TrackDescriptor::named("traced"));
        let rows = snapshot(&registry);
        assert!(rows[0].trace.is_some());

        // An explicit descriptor trace wins over capture.
        let other = Stub::pending();
        registry.track(
            &other,
            TrackDescriptor {
                name: "explicit".into(),
                trace: Some("from the descriptor".into()),
            },
        );
        let rows = snapshot(&registry);
        let explicit = rows.iter().find(|row| row.name == "explicit").unwrap();
        assert_eq!(explicit.trace.as_deref(), Some("from the descriptor"));
    }

    #[test]
    fn test_visitor_can_call_back_into_registry() {
        let registry = Arc::new(TaskRegistry::new());
        let item = Stub::pending();
        registry.track(&item, TrackDescriptor::named("reentrant"));

        let visits = AtomicUsize::new(0);
        registry.for_each_active(|_row| {
            // No registry lock is held here, so mutation is legal.
            registry.track(&Stub::pending(), TrackDescriptor::named("nested"));
            visits.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(visits.load(Ordering::SeqCst), 1);
    }
}
