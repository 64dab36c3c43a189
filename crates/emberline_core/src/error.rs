//! # Core Error Types
//!
//! All errors that can occur in the reset kernel.
//!
//! Only [`TickError`] ever reaches the game loop. A failing entity reset is
//! a [`ResetFailure`]: it is contained inside the reset task and turned into
//! an unregister, never propagated.

use std::time::Duration;

use thiserror::Error;

/// Why a single entity's reset failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResetFailure {
    /// The entity's reset returned an error.
    #[error("reset returned an error: {0}")]
    Error(String),

    /// The entity's reset panicked.
    #[error("reset panicked: {0}")]
    Panicked(String),
}

/// Errors from waiting on a [`CompletionBarrier`](crate::CompletionBarrier).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// The wait timed out with arrivals still outstanding.
    #[error("barrier wait timed out after {waited:?} with {remaining} arrivals outstanding")]
    Timeout {
        /// How long the waiter blocked.
        waited: Duration,
        /// Arrivals still missing.
        remaining: usize,
    },

    /// The barrier was already consumed by an earlier wait.
    #[error("barrier already waited on")]
    AlreadyWaited,
}

/// Errors from the worker pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool has been shut down and accepts no more jobs.
    #[error("worker pool is shut down")]
    ShutDown,

    /// The thread pool could not be built.
    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Errors from the world registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// The registry is at capacity.
    #[error("world full: capacity {capacity}")]
    Full {
        /// Maximum number of live entities.
        capacity: usize,
    },
}

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that abort a reset phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TickError {
    /// Resets were still outstanding when the barrier timeout expired.
    ///
    /// Usually a worker stuck inside an entity lock.
    #[error("tick {tick}: reset phase stalled with {remaining} of {dispatched} resets outstanding")]
    BarrierTimeout {
        /// The tick that stalled.
        tick: u64,
        /// Resets dispatched this tick.
        dispatched: usize,
        /// Resets that never arrived.
        remaining: usize,
    },

    /// The barrier was misused.
    #[error("tick {tick}: {source}")]
    Barrier {
        /// The tick being processed.
        tick: u64,
        /// The underlying barrier error.
        source: BarrierError,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for a reset phase.
pub type TickResult<T> = Result<T, TickError>;
