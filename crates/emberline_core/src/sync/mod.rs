//! # Synchronization Primitives for the Reset Phase
//!
//! ## The Problem
//!
//! ```text
//! Main thread:   tick logic ──> reset phase ──> next tick logic
//! Workers:                      reset NPC 1..N (in parallel)
//!
//! Without a barrier: next tick reads half-reset NPCs → CORRUPT STATE
//! With a global lock: workers serialize           → NO PARALLELISM
//! ```
//!
//! ## The Solution: One-Shot Completion Barrier
//!
//! The main thread sizes a barrier to the number of dispatched resets and
//! blocks on it. Every reset task owns an [`ArrivalGuard`], so the count
//! reaches zero exactly once no matter how each reset ends.

mod barrier;

pub use barrier::{Arrival, ArrivalGuard, CompletionBarrier};
