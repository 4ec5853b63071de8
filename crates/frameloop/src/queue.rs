//! Per-phase continuation queues.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use parking_lot::Mutex;

use crate::error::{Error, panic_message};

/// A one-shot deferred callback, run at the next drain of its phase.
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// FIFO queue of continuations for a single phase.
///
/// `enqueue` is callable from any thread, including from a continuation
/// running inside a drain of this same queue; such entries land in the
/// next batch, never the current one.
#[derive(Default)]
pub struct ContinuationQueue {
    pending: Mutex<VecDeque<Continuation>>,
}

impl ContinuationQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a continuation to the tail.
    pub fn enqueue(&self, continuation: Continuation) {
        self.pending.lock().push_back(continuation);
    }

    /// Number of continuations waiting for the next drain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Run every continuation that was enqueued before this call, in
    /// FIFO order, exactly once each.
    ///
    /// The batch is captured up front, so the queue lock is not held
    /// while user code runs. A panicking continuation does not stop the
    /// batch: the remaining entries still run, and the first failure is
    /// returned once the batch has finished.
    pub fn drain(&self) -> Result<(), Error> {
        let batch = std::mem::take(&mut *self.pending.lock());

        let mut first: Option<String> = None;
        let mut additional = 0;
        for continuation in batch {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(continuation)) {
                let message = panic_message(payload.as_ref());
                tracing::warn!(error = %message, "continuation panicked during drain");
                if first.is_some() {
                    additional += 1;
                } else {
                    first = Some(message);
                }
            }
        }

        match first {
            None => Ok(()),
            Some(first) => Err(Error::ContinuationPanicked { first, additional }),
        }
    }

    /// Discard all pending continuations without running them.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

impl fmt::Debug for ContinuationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationQueue")
            .field("pending", &self.len())
            .finish()
    }
}
