//! frameloop - tick-driven cooperative scheduling.
//!
//! Execution cadence comes from discrete, externally-triggered tick
//! signals rather than OS threads or a free-running event loop. Each
//! tick is subdivided into fixed phases (e.g. logic vs physics); every
//! phase owns a FIFO queue of one-shot continuations and a set of
//! long-lived pollable work items that are re-stepped once per tick
//! until they report completion.
//!
//! A non-owning [`TaskRegistry`] tracks live work items through weak
//! references for leak detection and inspection, without ever pinning
//! their lifetime.
//!
//! # Example
//!
//! ```
//! use frameloop::{Phase, Scheduler};
//!
//! let scheduler = Scheduler::logic_physics();
//! scheduler
//!     .enqueue(Phase::LOGIC, || {
//!         // runs once, on the next logic tick
//!     })
//!     .unwrap();
//!
//! // The host calls this once per phase per simulation tick.
//! scheduler.on_tick(Phase::LOGIC).unwrap();
//! ```
//!
//! # Threading
//!
//! Ticks are synchronous and single-threaded per phase; producers may
//! call `enqueue`, `add_item`, `track` and `untrack` from any thread,
//! concurrently with an in-progress tick. No lock is ever held while
//! user code (a continuation, a poll step, a snapshot visitor) runs.

mod error;
mod item;
mod phase;
mod queue;
mod registry;
mod runner;
mod scheduler;

pub use error::Error;
pub use item::{ItemStatus, PollItem};
pub use phase::{Phase, PhaseSet};
pub use queue::{Continuation, ContinuationQueue};
pub use registry::{TaskRegistry, TaskSnapshot, TrackDescriptor};
pub use runner::PollRunner;
pub use scheduler::{Scheduler, global, install};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Error, ItemStatus, Phase, PhaseSet, PollItem, Scheduler, TaskRegistry, TrackDescriptor,
    };
}
