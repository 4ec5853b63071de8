//! Scheduler error types.
//!
//! User callbacks (continuations, poll steps) have no result channel,
//! so "a callback failed" means it panicked. Panics are caught per
//! entry, converted to messages here, and surfaced to the tick caller
//! after the batch or pass completes. Misuse of the phase index or the
//! process-wide install slot is surfaced immediately.

use std::any::Any;

use thiserror::Error;

use crate::phase::Phase;

/// Errors surfaced by scheduler operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation referenced a phase outside the configured set.
    #[error("{phase:?} is not configured (phase count: {count})")]
    InvalidPhase {
        /// The out-of-range phase.
        phase: Phase,
        /// How many phases the scheduler was configured with.
        count: usize,
    },

    /// One or more continuations panicked during a drain. The captured
    /// batch still ran to completion before this was returned.
    #[error("continuation panicked during drain: {first} (+{additional} more in the same batch)")]
    ContinuationPanicked {
        /// Message of the first panic in the batch.
        first: String,
        /// Number of further panics in the same batch.
        additional: usize,
    },

    /// One or more poll steps panicked during a run pass. The failing
    /// items were dropped; every other item was still polled.
    #[error("poll step(s) panicked during run pass: {}", .failures.join("; "))]
    PollPanicked {
        /// Panic messages in slot order.
        failures: Vec<String>,
    },

    /// A second process-wide scheduler install was attempted while one
    /// is live. The existing instance is never replaced.
    #[error("a process-wide scheduler is already installed")]
    AlreadyInstalled,
}

/// Render a caught panic payload as a displayable message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
