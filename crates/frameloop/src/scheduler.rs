//! The phase-scoped scheduler and its process-wide accessor.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::item::PollItem;
use crate::phase::{Phase, PhaseSet};
use crate::queue::ContinuationQueue;
use crate::registry::TaskRegistry;
use crate::runner::PollRunner;

/// One ticking lane: a continuation queue and a pollable work runner.
struct Lane {
    queue: ContinuationQueue,
    runner: PollRunner,
}

impl Lane {
    fn new() -> Self {
        Self {
            queue: ContinuationQueue::new(),
            runner: PollRunner::new(),
        }
    }
}

/// Cooperative scheduler driven by external tick signals.
///
/// The host calls [`on_tick`](Scheduler::on_tick) once per phase per
/// simulation tick, in the phase set's order. All work for a phase runs
/// synchronously inside that call; producers on other threads may
/// enqueue and register work concurrently at any time.
pub struct Scheduler {
    phases: PhaseSet,
    lanes: Box<[Lane]>,
    registry: TaskRegistry,
}

impl Scheduler {
    /// Create a scheduler with the given phase set.
    #[must_use]
    pub fn new(phases: PhaseSet) -> Self {
        let lanes = (0..phases.len()).map(|_| Lane::new()).collect();
        Self {
            phases,
            lanes,
            registry: TaskRegistry::new(),
        }
    }

    /// Scheduler with the conventional logic/physics lane pair.
    #[must_use]
    pub fn logic_physics() -> Self {
        Self::new(PhaseSet::logic_physics())
    }

    /// The configured phase set.
    #[must_use]
    pub fn phases(&self) -> &PhaseSet {
        &self.phases
    }

    /// The live-task registry for this scheduler.
    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    fn lane(&self, phase: Phase) -> Result<&Lane, Error> {
        self.lanes.get(phase.index()).ok_or(Error::InvalidPhase {
            phase,
            count: self.lanes.len(),
        })
    }

    /// Schedule a continuation to run at the next tick of `phase`.
    pub fn enqueue(
        &self,
        phase: Phase,
        continuation: impl FnOnce() + Send + 'static,
    ) -> Result<(), Error> {
        self.lane(phase)?.queue.enqueue(Box::new(continuation));
        Ok(())
    }

    /// Register a work item to be polled once per tick of `phase`.
    pub fn add_item(&self, phase: Phase, item: Arc<dyn PollItem>) -> Result<(), Error> {
        self.lane(phase)?.runner.add_item(item);
        Ok(())
    }

    /// Withdraw a work item from `phase`; it is never polled again.
    pub fn remove_item(&self, phase: Phase, item: &Arc<dyn PollItem>) -> Result<(), Error> {
        self.lane(phase)?.runner.remove(item);
        Ok(())
    }

    /// Tick one phase: drain its continuations, then step its pollable
    /// items.
    ///
    /// Draining first means a continuation that registers new work this
    /// tick has that work visible to the same tick's bookkeeping, while
    /// the runner still defers it to the next pass. Failures from both
    /// halves are captured after their batch/pass completes; if both
    /// fail, the drain failure is returned and the poll failures have
    /// already been logged.
    pub fn on_tick(&self, phase: Phase) -> Result<(), Error> {
        let lane = self.lane(phase)?;
        let drained = lane.queue.drain();
        let ran = lane.runner.run();
        drained.and(ran)
    }

    /// Tick every phase once, in configured order.
    pub fn on_tick_all(&self) -> Result<(), Error> {
        for phase in self.phases.iter() {
            self.on_tick(phase)?;
        }
        Ok(())
    }

    /// Tear down: discard all pending continuations and work items for
    /// every phase without executing them, clear the registry, and
    /// release the process-wide slot if this instance occupies it.
    pub fn shutdown(self: &Arc<Self>) {
        for lane in &self.lanes {
            lane.queue.clear();
            lane.runner.clear();
        }
        self.registry.clear();
        release_if_installed(self);
        tracing::debug!("scheduler shut down");
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("phases", &self.phases)
            .field("registry", &self.registry)
            .finish()
    }
}

static INSTALLED: Mutex<Option<Arc<Scheduler>>> = Mutex::new(None);

/// Install `scheduler` as the process-wide instance.
///
/// Exactly one instance may be live at a time: a second install fails
/// with [`Error::AlreadyInstalled`] and the existing instance keeps all
/// work registered against it. The slot is released by
/// [`Scheduler::shutdown`].
pub fn install(scheduler: Arc<Scheduler>) -> Result<(), Error> {
    let mut slot = INSTALLED.lock();
    if slot.is_some() {
        return Err(Error::AlreadyInstalled);
    }
    *slot = Some(scheduler);
    tracing::debug!("installed process-wide scheduler");
    Ok(())
}

/// The process-wide scheduler, if one is installed.
#[must_use]
pub fn global() -> Option<Arc<Scheduler>> {
    INSTALLED.lock().clone()
}

fn release_if_installed(scheduler: &Arc<Scheduler>) {
    let mut slot = INSTALLED.lock();
    if slot
        .as_ref()
        .is_some_and(|installed| Arc::ptr_eq(installed, scheduler))
    {
        *slot = None;
    }
}
