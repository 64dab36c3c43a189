//! # EMBERLINE
//!
//! The game server crate, built on the reset kernel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         EMBERLINE GAME SERVER                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐   │
//! │  │   GAMEPLAY      │     │   GAME LOOP     │     │   CORE          │   │
//! │  │                 │────>│                 │────>│                 │   │
//! │  │  • Npc          │     │  • TickClock    │     │  • World        │   │
//! │  │  • UpdateFlags  │     │  • GameServer   │     │  • Barrier      │   │
//! │  │  • reset()      │     │  • ServerStats  │     │  • WorkerPool   │   │
//! │  └─────────────────┘     └─────────────────┘     └─────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: Server configuration (TOML)
//! - `game_loop`: Tick orchestration and timing
//! - `gameplay`: NPCs and their per-tick state

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod game_loop;
pub mod gameplay;

// Re-export the kernel
pub use emberline_core as kernel;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{NpcError, ServerError, ServerResult};
pub use game_loop::{GameServer, ServerStats, TickClock, TickStats, TickSummary};
pub use gameplay::{Npc, NpcType, UpdateFlags};
