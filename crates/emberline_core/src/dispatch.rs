//! # Reset Dispatcher
//!
//! Runs the per-tick reset phase on behalf of the main simulation thread:
//!
//! ```text
//! 1. SNAPSHOT   world.active()                  -> N entities
//! 2. BARRIER    CompletionBarrier::new(N)
//! 3. SUBMIT     N x ResetTask -> executor
//! 4. WAIT       block until N arrivals (optionally bounded)
//! 5. REPORT     fold the tally into a TickReport
//! ```
//!
//! The calling thread is blocked for the whole phase and touches no entity
//! while the wait is pending, so workers have the entities to themselves.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ResetConfig;
use crate::ecs::{EntityId, Resettable, World};
use crate::error::{BarrierError, TickError, TickResult};
use crate::pool::Executor;
use crate::sync::CompletionBarrier;
use crate::task::{ResetContext, ResetObserver, ResetTask};

/// Outcome of one reset phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that was reset.
    pub tick: u64,
    /// Reset tasks dispatched (barrier size).
    pub dispatched: usize,
    /// Resets that completed.
    pub succeeded: usize,
    /// Resets that failed and were contained.
    pub failed: usize,
    /// Tasks the executor refused. They arrived without running.
    pub rejected: usize,
    /// Entities removed from the world this phase.
    pub unregistered: Vec<EntityId>,
    /// Wall time of the whole phase.
    pub elapsed: Duration,
}

impl TickReport {
    /// Returns true if every dispatched reset completed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.rejected == 0
    }
}

/// Dispatches one reset task per active entity and waits for all of them.
pub struct ResetDispatcher<E, X: ?Sized> {
    world: Arc<World<E>>,
    executor: Arc<X>,
    observer: Arc<dyn ResetObserver>,
    barrier_timeout: Option<Duration>,
}

impl<E: Resettable, X: Executor + ?Sized> ResetDispatcher<E, X> {
    /// Creates a dispatcher that waits for resets without a timeout.
    #[must_use]
    pub fn new(world: Arc<World<E>>, executor: Arc<X>, observer: Arc<dyn ResetObserver>) -> Self {
        Self {
            world,
            executor,
            observer,
            barrier_timeout: None,
        }
    }

    /// Creates a dispatcher using the barrier timeout from `config`.
    #[must_use]
    pub fn from_config(
        world: Arc<World<E>>,
        executor: Arc<X>,
        observer: Arc<dyn ResetObserver>,
        config: &ResetConfig,
    ) -> Self {
        Self::new(world, executor, observer).with_barrier_timeout(config.barrier_timeout())
    }

    /// Bounds how long a reset phase may block the caller.
    ///
    /// `None` waits forever.
    #[must_use]
    pub fn with_barrier_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.barrier_timeout = timeout;
        self
    }

    /// Returns the world being reset.
    #[inline]
    #[must_use]
    pub fn world(&self) -> &Arc<World<E>> {
        &self.world
    }

    /// Returns the executor running the resets.
    #[inline]
    #[must_use]
    pub fn executor(&self) -> &Arc<X> {
        &self.executor
    }

    /// Returns the configured barrier timeout.
    #[inline]
    #[must_use]
    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout
    }

    /// Resets every active entity in parallel and blocks until all are done.
    ///
    /// Failing entities are removed from the world before this returns, so
    /// the next tick never sees them.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::BarrierTimeout`] if a barrier timeout is set and
    /// expires with resets outstanding. Per-entity failures are never
    /// errors; they show up in [`TickReport::failed`].
    pub fn run_reset_phase(&self, tick: u64) -> TickResult<TickReport> {
        let start = Instant::now();

        let entities = self.world.active();
        let dispatched = entities.len();
        let barrier = Arc::new(CompletionBarrier::new(dispatched));
        let context = Arc::new(ResetContext::new(
            tick,
            Arc::clone(&self.world),
            Arc::clone(&self.observer),
        ));

        let mut rejected = 0;
        for entity in entities {
            let task = ResetTask::new(entity, &barrier, &context);
            let entity_id = task.entity_id();
            if let Err(error) = self.executor.execute(Box::new(move || {
                task.run();
            })) {
                rejected += 1;
                tracing::error!(tick, entity = %entity_id, error = %error, "reset task rejected");
            }
        }

        let waited = match self.barrier_timeout {
            Some(timeout) => barrier.wait_timeout(timeout),
            None => barrier.wait(),
        };
        waited.map_err(|error| match error {
            BarrierError::Timeout { remaining, .. } => {
                tracing::error!(tick, dispatched, remaining, "reset phase stalled");
                TickError::BarrierTimeout {
                    tick,
                    dispatched,
                    remaining,
                }
            }
            source @ BarrierError::AlreadyWaited => TickError::Barrier { tick, source },
        })?;

        let tally = context.tally();
        let report = TickReport {
            tick,
            dispatched,
            succeeded: tally.succeeded(),
            failed: tally.failed(),
            rejected,
            unregistered: tally.unregistered(),
            elapsed: start.elapsed(),
        };

        if report.is_clean() {
            tracing::trace!(tick, dispatched, elapsed = ?report.elapsed, "reset phase complete");
        } else {
            tracing::warn!(
                tick,
                dispatched,
                failed = report.failed,
                rejected = report.rejected,
                removed = report.unregistered.len(),
                "reset phase complete with failures"
            );
        }

        Ok(report)
    }
}

impl<E, X: ?Sized> fmt::Debug for ResetDispatcher<E, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetDispatcher")
            .field("barrier_timeout", &self.barrier_timeout)
            .finish_non_exhaustive()
    }
}
