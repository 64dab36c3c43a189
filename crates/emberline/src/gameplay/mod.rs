//! # Gameplay Systems
//!
//! This module contains gameplay-specific systems:
//! - NPCs and their per-tick update state

pub mod npc;

pub use npc::{
    Direction, Npc, NpcType, UpdateFlags, NPC_CHAT_INTERVAL, NPC_EMOTE_INTERVAL, NPC_HIT_CHANCE,
    NPC_MOVE_CHANCE, NPC_WANDER_RADIUS,
};
