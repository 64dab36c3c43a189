//! # EMBERLINE Core
//!
//! Per-tick parallel reset of simulated entities, designed for:
//! - Thousands of NPCs reset concurrently between game ticks
//! - A main thread that blocks only until the last reset lands
//! - A tick loop that survives any single entity failing to reset
//!
//! ## Architecture Rules
//!
//! 1. **One lock per entity** - Every access to entity state goes through its [`EntityCell`]
//! 2. **Exactly one arrival per task** - The barrier count is owned by the task, not the code path
//! 3. **Failures are contained** - A failed reset is logged and the entity is unregistered
//!
//! ## Example
//!
//! ```rust,ignore
//! use emberline_core::{ResetDispatcher, TracingObserver, World, WorkerPool};
//!
//! let world = Arc::new(World::new(8192));
//! let pool = Arc::new(WorkerPool::new(4, "reset-worker")?);
//! let dispatcher = ResetDispatcher::new(world, pool, Arc::new(TracingObserver));
//! let report = dispatcher.run_reset_phase(tick)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod dispatch;
pub mod ecs;
pub mod error;
pub mod pool;
pub mod sync;
pub mod task;

pub use config::ResetConfig;
pub use dispatch::{ResetDispatcher, TickReport};
pub use ecs::{EntityCell, EntityId, EntityRegistry, Resettable, World};
pub use error::{BarrierError, ConfigError, PoolError, ResetFailure, TickError, WorldError};
pub use pool::{build_executor, Executor, InlineExecutor, Job, WorkerPool};
pub use sync::{Arrival, ArrivalGuard, CompletionBarrier};
pub use task::{
    FailureReport, RecordingObserver, ResetContext, ResetObserver, ResetOutcome, ResetTask,
    TickTally, TracingObserver,
};
