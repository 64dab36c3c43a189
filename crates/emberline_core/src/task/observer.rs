//! # Reset Observers
//!
//! The logging capability handed to every reset task. Injected per tick
//! through the [`ResetContext`](super::ResetContext) rather than reached
//! through a global, so the failure path can be asserted on in tests.

use parking_lot::Mutex;

use crate::ecs::EntityId;
use crate::error::ResetFailure;

/// A contained reset failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureReport {
    /// Tick during which the reset failed.
    pub tick: u64,
    /// The entity whose reset failed.
    pub entity: EntityId,
    /// What went wrong.
    pub failure: ResetFailure,
}

/// Receives failure-path events from reset tasks.
///
/// Called from worker threads, concurrently.
pub trait ResetObserver: Send + Sync {
    /// A reset failed and is being contained.
    fn reset_failed(&self, report: &FailureReport);

    /// A failed entity was removed from the world.
    fn entity_unregistered(&self, _tick: u64, _entity: EntityId) {}
}

/// Observer that logs through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ResetObserver for TracingObserver {
    fn reset_failed(&self, report: &FailureReport) {
        tracing::warn!(
            tick = report.tick,
            entity = %report.entity,
            error = %report.failure,
            "entity failed to reset for the next game tick"
        );
    }

    fn entity_unregistered(&self, tick: u64, entity: EntityId) {
        tracing::info!(tick, entity = %entity, "unregistered entity after failed reset");
    }
}

/// Observer that keeps every event in memory.
///
/// For tests and post-mortem diagnostics. Events are also logged at
/// debug level.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    failures: Mutex<Vec<FailureReport>>,
    unregistered: Mutex<Vec<(u64, EntityId)>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every failure recorded so far.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureReport> {
        self.failures.lock().clone()
    }

    /// Returns the number of failures recorded so far.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.lock().len()
    }

    /// Returns every `(tick, entity)` unregistered so far.
    #[must_use]
    pub fn unregistered(&self) -> Vec<(u64, EntityId)> {
        self.unregistered.lock().clone()
    }

    /// Forgets everything recorded.
    pub fn clear(&self) {
        self.failures.lock().clear();
        self.unregistered.lock().clear();
    }
}

impl ResetObserver for RecordingObserver {
    fn reset_failed(&self, report: &FailureReport) {
        tracing::debug!(tick = report.tick, entity = %report.entity, error = %report.failure, "recorded reset failure");
        self.failures.lock().push(report.clone());
    }

    fn entity_unregistered(&self, tick: u64, entity: EntityId) {
        self.unregistered.lock().push((tick, entity));
    }
}
