//! # NPC System
//!
//! Server-side non-player characters.
//!
//! Every NPC carries two kinds of state:
//! - **Persistent**: identity, type, position, hitpoints. Survives ticks.
//! - **Transient**: update flags and the per-tick masks (animation, chat,
//!   hits, movement direction, facing). Produced by [`Npc::process`] during
//!   the logic phase and cleared by [`Resettable::reset`] before the next tick.
//!
//! Behaviour is deterministic: each NPC owns an LCG seeded from its id and
//! spawn point, so a replay of the same ticks produces the same world.

use emberline_core::Resettable;

use crate::error::NpcError;

// ============================================================================
// NPC CONSTANTS
// ============================================================================

/// Wander radius around the home position (tiles).
pub const NPC_WANDER_RADIUS: f32 = 5.0;

/// Chance per tick that an idle NPC takes a step.
pub const NPC_MOVE_CHANCE: f32 = 0.4;

/// Chance per tick that a hostile NPC is hit.
pub const NPC_HIT_CHANCE: f32 = 0.1;

/// Ticks between idle animations.
pub const NPC_EMOTE_INTERVAL: u64 = 8;

/// Ticks between wanderer chat lines.
pub const NPC_CHAT_INTERVAL: u64 = 25;

// ============================================================================
// NPC TYPES
// ============================================================================

/// Types of NPCs that can exist in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NpcType {
    /// A guardian of the forest. Stands watch over its post.
    ForestGuardian,
    /// A wandering merchant. Talks to passers-by.
    Wanderer,
    /// A hostile creature. Gets into fights.
    Hostile,
}

impl NpcType {
    /// All NPC types, in spawn rotation order.
    pub const ALL: [NpcType; 3] = [NpcType::ForestGuardian, NpcType::Wanderer, NpcType::Hostile];

    /// Returns the display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            NpcType::ForestGuardian => "Forest Guardian",
            NpcType::Wanderer => "Wanderer",
            NpcType::Hostile => "Hostile",
        }
    }

    /// Returns the hitpoint ceiling for this type.
    #[must_use]
    pub fn max_hitpoints(self) -> u32 {
        match self {
            NpcType::ForestGuardian => 120,
            NpcType::Wanderer => 40,
            NpcType::Hostile => 80,
        }
    }

    /// Returns the animation played when idle.
    #[must_use]
    pub fn idle_animation(self) -> u16 {
        match self {
            NpcType::ForestGuardian => 808,
            NpcType::Wanderer => 855,
            NpcType::Hostile => 4230,
        }
    }
}

// ============================================================================
// TRANSIENT STATE
// ============================================================================

/// Per-tick update mask. Tells observers what changed this tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UpdateFlags(u8);

impl UpdateFlags {
    /// The NPC moved.
    pub const MOVED: Self = Self(1 << 0);
    /// An animation was started.
    pub const ANIMATION: Self = Self(1 << 1);
    /// The NPC said something overhead.
    pub const FORCED_CHAT: Self = Self(1 << 2);
    /// The NPC was hit.
    pub const HIT: Self = Self(1 << 3);
    /// The NPC turned to face a point.
    pub const FACE: Self = Self(1 << 4);

    /// No flags set.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns the raw mask.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if no flag is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every flag in `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets every flag in `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Compass direction of a single step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// +Z
    North,
    /// +X
    East,
    /// -Z
    South,
    /// -X
    West,
}

impl Direction {
    /// All directions, clockwise from north.
    pub const ALL: [Direction; 4] = [Direction::North, Direction::East, Direction::South, Direction::West];

    /// Returns the (x, z) tile delta of one step.
    #[must_use]
    pub fn delta(self) -> [f32; 2] {
        match self {
            Direction::North => [0.0, 1.0],
            Direction::East => [1.0, 0.0],
            Direction::South => [0.0, -1.0],
            Direction::West => [-1.0, 0.0],
        }
    }

    /// Returns the facing angle (degrees, 0 = +Z, 90 = +X).
    #[must_use]
    pub fn yaw(self) -> f32 {
        match self {
            Direction::North => 0.0,
            Direction::East => 90.0,
            Direction::South => 180.0,
            Direction::West => 270.0,
        }
    }
}

// ============================================================================
// NPC
// ============================================================================

/// A non-player character entity.
#[derive(Clone, Debug)]
pub struct Npc {
    /// Spawn id.
    pub id: u32,
    /// NPC type.
    pub npc_type: NpcType,
    /// Current position (feet).
    pub position: [f32; 3],
    /// Home position (spawn point) for wander calculations.
    pub home: [f32; 3],
    /// Facing direction (degrees, 0 = +Z, 90 = +X).
    pub yaw: f32,
    /// Current hitpoints.
    pub hitpoints: u32,

    /// What changed this tick.
    pub flags: UpdateFlags,
    /// Animation started this tick.
    pub animation: Option<u16>,
    /// Overhead text this tick.
    pub forced_chat: Option<String>,
    /// Damage taken this tick, in order.
    pub pending_hits: Vec<u32>,
    /// Step taken this tick.
    pub primary_direction: Option<Direction>,
    /// Point the NPC turned towards this tick.
    pub face_target: Option<[f32; 3]>,

    /// Random seed for this NPC (deterministic behavior).
    seed: u32,
}

impl Npc {
    /// Creates a new NPC at the given position, at full health.
    #[must_use]
    pub fn new(id: u32, npc_type: NpcType, position: [f32; 3]) -> Self {
        // Generate deterministic seed from ID and position
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let seed = id.wrapping_mul(2_654_435_769)
            ^ (position[0] as i32 as u32).wrapping_mul(73_856_093)
            ^ (position[2] as i32 as u32).wrapping_mul(19_349_663);

        Self {
            id,
            npc_type,
            position,
            home: position,
            yaw: 0.0,
            hitpoints: npc_type.max_hitpoints(),
            flags: UpdateFlags::empty(),
            animation: None,
            forced_chat: None,
            pending_hits: Vec::new(),
            primary_direction: None,
            face_target: None,
            seed,
        }
    }

    /// Returns true if any transient state is set.
    #[must_use]
    pub fn has_pending_updates(&self) -> bool {
        !self.flags.is_empty()
            || self.animation.is_some()
            || self.forced_chat.is_some()
            || !self.pending_hits.is_empty()
            || self.primary_direction.is_some()
            || self.face_target.is_some()
    }

    /// Corrupts the NPC's persistent state so every later reset fails.
    ///
    /// Fault injection for the demo server and tests.
    pub fn poison(&mut self) {
        self.hitpoints = u32::MAX;
    }

    /// Advances the seed and returns its upper bits.
    fn next_seed(&mut self) -> u32 {
        // LCG random number generator
        self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.seed >> 16
    }

    /// Generates a pseudo-random float [0, 1) using the NPC's seed.
    #[allow(clippy::cast_precision_loss)]
    fn random(&mut self) -> f32 {
        (self.next_seed() & 0x7FFF) as f32 / 32768.0
    }

    /// Runs one tick of NPC logic, recording what happened in the
    /// transient state.
    ///
    /// Main thread only, between reset phases.
    pub fn process(&mut self, tick: u64) {
        self.wander();

        if tick % NPC_EMOTE_INTERVAL == u64::from(self.id) % NPC_EMOTE_INTERVAL {
            self.animation = Some(self.npc_type.idle_animation());
            self.flags.insert(UpdateFlags::ANIMATION);
        }

        match self.npc_type {
            NpcType::ForestGuardian => {
                if self.primary_direction.is_some() {
                    self.face_target = Some(self.home);
                    self.flags.insert(UpdateFlags::FACE);
                }
            }
            NpcType::Wanderer => {
                if tick % NPC_CHAT_INTERVAL == u64::from(self.id) % NPC_CHAT_INTERVAL {
                    self.forced_chat = Some(format!("Wares for sale! (tick {tick})"));
                    self.flags.insert(UpdateFlags::FORCED_CHAT);
                }
            }
            NpcType::Hostile => {
                if self.random() < NPC_HIT_CHANCE {
                    let damage = 1 + self.next_seed() % 8;
                    self.take_hit(damage);
                }
            }
        }
    }

    /// Takes a single step within the wander radius.
    fn wander(&mut self) {
        if self.random() >= NPC_MOVE_CHANCE {
            return;
        }

        let direction = Direction::ALL[(self.next_seed() % 4) as usize];
        let [dx, dz] = direction.delta();
        let target = [self.position[0] + dx, self.position[1], self.position[2] + dz];

        let ox = target[0] - self.home[0];
        let oz = target[2] - self.home[2];
        if (ox * ox + oz * oz).sqrt() > NPC_WANDER_RADIUS {
            return;
        }

        self.position = target;
        self.yaw = direction.yaw();
        self.primary_direction = Some(direction);
        self.flags.insert(UpdateFlags::MOVED);
    }

    /// Applies damage. A defeated NPC respawns at home at full health.
    fn take_hit(&mut self, damage: u32) {
        self.pending_hits.push(damage);
        self.flags.insert(UpdateFlags::HIT);

        self.hitpoints = self.hitpoints.saturating_sub(damage);
        if self.hitpoints == 0 {
            self.hitpoints = self.npc_type.max_hitpoints();
            self.position = self.home;
        }
    }

    /// Checks the persistent state.
    fn validate(&self) -> Result<(), NpcError> {
        if !self.position.iter().all(|axis| axis.is_finite()) {
            return Err(NpcError::CorruptState {
                id: self.id,
                reason: format!("non-finite position {:?}", self.position),
            });
        }
        let max = self.npc_type.max_hitpoints();
        if self.hitpoints > max {
            return Err(NpcError::CorruptState {
                id: self.id,
                reason: format!("hitpoints {} above maximum {max}", self.hitpoints),
            });
        }
        Ok(())
    }
}

impl Resettable for Npc {
    type Error = NpcError;

    /// Clears every per-tick mask so the next tick starts clean.
    ///
    /// Refuses if the persistent state is corrupt; the NPC is then removed
    /// from the world by the reset phase.
    fn reset(&mut self) -> Result<(), NpcError> {
        self.validate()?;

        self.flags = UpdateFlags::empty();
        self.animation = None;
        self.forced_chat = None;
        self.pending_hits.clear();
        self.primary_direction = None;
        self.face_target = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty_npc(npc_type: NpcType) -> Npc {
        let mut npc = Npc::new(7, npc_type, [10.0, 0.0, 10.0]);
        npc.flags.insert(UpdateFlags::MOVED);
        npc.flags.insert(UpdateFlags::HIT);
        npc.animation = Some(1);
        npc.forced_chat = Some("hi".into());
        npc.pending_hits.push(3);
        npc.primary_direction = Some(Direction::East);
        npc.face_target = Some([0.0; 3]);
        npc
    }

    #[test]
    fn test_npc_creation() {
        let npc = Npc::new(1, NpcType::ForestGuardian, [10.0, 20.0, 30.0]);
        assert_eq!(npc.id, 1);
        assert_eq!(npc.npc_type, NpcType::ForestGuardian);
        assert_eq!(npc.position, [10.0, 20.0, 30.0]);
        assert_eq!(npc.hitpoints, 120);
        assert!(!npc.has_pending_updates());
    }

    #[test]
    fn test_update_flags() {
        let mut flags = UpdateFlags::empty();
        assert!(flags.is_empty());

        flags.insert(UpdateFlags::MOVED);
        flags.insert(UpdateFlags::FACE);

        assert!(flags.contains(UpdateFlags::MOVED));
        assert!(!flags.contains(UpdateFlags::HIT));
        assert_eq!(flags.bits(), 0b1_0001);
    }

    #[test]
    fn test_reset_clears_transient_state_only() {
        let mut npc = dirty_npc(NpcType::Hostile);
        npc.position = [11.0, 0.0, 10.0];
        npc.hitpoints = 50;

        npc.reset().unwrap();

        assert!(!npc.has_pending_updates());
        assert_eq!(npc.position, [11.0, 0.0, 10.0]);
        assert_eq!(npc.hitpoints, 50);
    }

    #[test]
    fn test_poisoned_npc_fails_every_reset() {
        let mut npc = dirty_npc(NpcType::Wanderer);
        npc.poison();

        for _ in 0..3 {
            assert!(matches!(npc.reset(), Err(NpcError::CorruptState { id: 7, .. })));
        }
    }

    #[test]
    fn test_non_finite_position_is_corrupt() {
        let mut npc = Npc::new(2, NpcType::ForestGuardian, [0.0; 3]);
        npc.position[1] = f32::NAN;
        assert!(npc.reset().is_err());
    }

    #[test]
    fn test_process_is_deterministic() {
        let mut a = Npc::new(3, NpcType::Hostile, [4.0, 0.0, -2.0]);
        let mut b = a.clone();

        for tick in 1..=200 {
            a.process(tick);
            b.process(tick);
            assert_eq!(a.position, b.position);
            assert_eq!(a.flags, b.flags);
            assert_eq!(a.pending_hits, b.pending_hits);
            a.reset().unwrap();
            b.reset().unwrap();
        }
    }

    #[test]
    fn test_wander_stays_near_home() {
        let mut npc = Npc::new(9, NpcType::Wanderer, [100.0, 5.0, 100.0]);

        for tick in 1..=1000 {
            npc.process(tick);
            let dx = npc.position[0] - npc.home[0];
            let dz = npc.position[2] - npc.home[2];
            assert!((dx * dx + dz * dz).sqrt() <= NPC_WANDER_RADIUS);
            npc.reset().unwrap();
        }
    }

    #[test]
    fn test_process_produces_updates() {
        let mut npc = Npc::new(0, NpcType::Wanderer, [0.0; 3]);

        // Tick 0 lines up with both the emote and chat schedule for id 0.
        npc.process(0);

        assert!(npc.flags.contains(UpdateFlags::ANIMATION));
        assert!(npc.flags.contains(UpdateFlags::FORCED_CHAT));
        assert_eq!(npc.animation, Some(NpcType::Wanderer.idle_animation()));
        assert!(npc.has_pending_updates());
    }

    #[test]
    fn test_defeated_npc_respawns_at_home() {
        let mut npc = Npc::new(4, NpcType::Hostile, [1.0, 0.0, 1.0]);
        npc.position = [3.0, 0.0, 1.0];

        npc.take_hit(500);

        assert_eq!(npc.hitpoints, NpcType::Hostile.max_hitpoints());
        assert_eq!(npc.position, npc.home);
        assert_eq!(npc.pending_hits, vec![500]);
        assert!(npc.flags.contains(UpdateFlags::HIT));
    }
}
