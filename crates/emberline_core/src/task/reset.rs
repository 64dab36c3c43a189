//! # Reset Task
//!
//! The unit of concurrent work: one entity, one tick, one arrival.
//!
//! ```text
//!   lock(entity) ──> reset() ──┬── Ok ─────────────────────────────┐
//!                              │                                   │
//!                              └── Err / panic ──> report          │
//!                                                  unregister      │
//!                                                      │           │
//!                                                      ▼           ▼
//!                                            ArrivalGuard dropped: arrive()
//! ```
//!
//! The arrival is owned by the task, not performed by it. Whatever path
//! the task takes (including never being run at all) the guard is dropped
//! exactly once and the tick's barrier counts exactly one arrival.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::observer::{FailureReport, ResetObserver};
use crate::ecs::{EntityCell, EntityId, EntityRegistry, Resettable};
use crate::error::ResetFailure;
use crate::sync::{ArrivalGuard, CompletionBarrier};

/// How one entity's reset ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Transient state cleared.
    Completed,
    /// The reset failed; the entity has been contained.
    Failed(ResetFailure),
}

impl ResetOutcome {
    /// Returns true if the reset completed.
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Per-tick outcome counters, shared by every task of the tick.
#[derive(Debug, Default)]
pub struct TickTally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    unregistered: Mutex<Vec<EntityId>>,
}

impl TickTally {
    /// Returns the number of resets that completed.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Acquire)
    }

    /// Returns the number of resets that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }

    /// Returns the entities removed from the world, in removal order.
    #[must_use]
    pub fn unregistered(&self) -> Vec<EntityId> {
        self.unregistered.lock().clone()
    }

    fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::AcqRel);
    }

    fn record_failure(&self, entity: EntityId, removed: bool) {
        self.failed.fetch_add(1, Ordering::AcqRel);
        if removed {
            self.unregistered.lock().push(entity);
        }
    }
}

/// Everything the tasks of one tick share besides the barrier.
pub struct ResetContext<R> {
    tick: u64,
    registry: Arc<R>,
    observer: Arc<dyn ResetObserver>,
    tally: TickTally,
}

impl<R: EntityRegistry> ResetContext<R> {
    /// Creates the shared context for `tick`.
    #[must_use]
    pub fn new(tick: u64, registry: Arc<R>, observer: Arc<dyn ResetObserver>) -> Self {
        Self {
            tick,
            registry,
            observer,
            tally: TickTally::default(),
        }
    }

    /// Returns the tick this context belongs to.
    #[inline]
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Returns the tick's outcome counters.
    #[inline]
    #[must_use]
    pub fn tally(&self) -> &TickTally {
        &self.tally
    }
}

impl<R> fmt::Debug for ResetContext<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetContext")
            .field("tick", &self.tick)
            .field("tally", &self.tally)
            .finish_non_exhaustive()
    }
}

/// Resets a single entity for the next tick.
///
/// Created by the dispatcher immediately before submission and consumed by
/// [`ResetTask::run`]. Never reused across ticks.
pub struct ResetTask<E, R> {
    /// The entity to reset.
    entity: Arc<EntityCell<E>>,
    /// Tick-wide collaborators.
    context: Arc<ResetContext<R>>,
    /// This task's single arrival at the tick barrier.
    arrival: ArrivalGuard,
}

impl<E: Resettable, R: EntityRegistry> ResetTask<E, R> {
    /// Binds a reset of `entity` to the tick's barrier and context.
    ///
    /// The barrier's count must include this task.
    #[must_use]
    pub fn new(
        entity: Arc<EntityCell<E>>,
        barrier: &Arc<CompletionBarrier>,
        context: &Arc<ResetContext<R>>,
    ) -> Self {
        Self {
            entity,
            context: Arc::clone(context),
            arrival: ArrivalGuard::new(Arc::clone(barrier)),
        }
    }

    /// Returns the entity this task resets.
    #[inline]
    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        self.entity.id()
    }

    /// Runs the reset and contains any failure.
    ///
    /// Never panics because of the entity: an error or panic from
    /// `reset()` is reported, the entity is unregistered, and the outcome
    /// is returned. The barrier arrival happens as this call returns.
    pub fn run(self) -> ResetOutcome {
        // Declared first, dropped last.
        let _arrival = self.arrival;
        let id = self.entity.id();

        let outcome = {
            let mut entity = self.entity.lock();
            reset_contained(&mut *entity)
        };

        match &outcome {
            ResetOutcome::Completed => self.context.tally.record_success(),
            ResetOutcome::Failed(failure) => contain(&self.context, id, failure.clone()),
        }

        outcome
    }
}

impl<E, R> fmt::Debug for ResetTask<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetTask")
            .field("entity", &self.entity.id())
            .field("tick", &self.context.tick)
            .finish_non_exhaustive()
    }
}

/// Calls `reset` and folds both error returns and panics into the outcome.
fn reset_contained<E: Resettable>(entity: &mut E) -> ResetOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| entity.reset())) {
        Ok(Ok(())) => ResetOutcome::Completed,
        Ok(Err(error)) => ResetOutcome::Failed(ResetFailure::Error(error.to_string())),
        Err(payload) => ResetOutcome::Failed(ResetFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

/// The failure path: report, then remove the entity from the world.
fn contain<R: EntityRegistry>(context: &ResetContext<R>, id: EntityId, failure: ResetFailure) {
    let report = FailureReport {
        tick: context.tick,
        entity: id,
        failure,
    };
    context.observer.reset_failed(&report);

    let removed = context.registry.unregister(id);
    if removed {
        context.observer.entity_unregistered(context.tick, id);
    }
    context.tally.record_failure(id, removed);
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
