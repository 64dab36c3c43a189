//! # Server Error Types

use emberline_core::{ConfigError, PoolError, TickError, WorldError};
use thiserror::Error;

/// Why an NPC could not be reset for the next tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NpcError {
    /// Persistent state failed validation.
    #[error("npc {id} has corrupt state: {reason}")]
    CorruptState {
        /// The NPC's spawn id.
        id: u32,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors that stop the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The reset worker pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// An NPC could not be spawned.
    #[error(transparent)]
    World(#[from] WorldError),

    /// A tick's reset phase did not complete.
    #[error(transparent)]
    Tick(#[from] TickError),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
