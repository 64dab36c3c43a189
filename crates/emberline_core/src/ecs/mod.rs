//! # Entities and the World Registry
//!
//! ## Design Philosophy
//!
//! - Entity IDs are simple slot indices with generation counters
//! - Every entity lives in its own [`EntityCell`]; the cell's lock is the
//!   only way in, from worker threads and the main thread alike
//! - The registry hands out snapshots, never long-lived borrows

mod entity;
mod world;

pub use entity::{EntityCell, EntityId, Resettable};
pub use world::{EntityRegistry, World};
