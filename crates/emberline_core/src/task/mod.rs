//! # Per-Entity Reset Work
//!
//! - [`ResetTask`]: the unit of work submitted to the pool, one per entity
//!   per tick
//! - [`ResetContext`]: what all tasks of a tick share (registry, observer,
//!   tally)
//! - [`ResetObserver`]: the injected logging capability for the failure path

mod observer;
mod reset;

pub(crate) use reset::panic_message;

pub use observer::{FailureReport, RecordingObserver, ResetObserver, TracingObserver};
pub use reset::{ResetContext, ResetOutcome, ResetTask, TickTally};
