//! # Entity Management
//!
//! Entities are identified by a lightweight [`EntityId`] consisting of:
//! - An index into the registry's slot array
//! - A generation counter for safe reuse
//!
//! The entity value itself lives inside an [`EntityCell`]: the one and only
//! door to its state. Workers and the main thread both go through the
//! cell's lock, so a reset can never race with itself or with game logic.

use std::fmt;

use parking_lot::{Mutex, MutexGuard};

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index in the registry
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The slot index (0 to 2^32-1)
    /// * `generation` - The generation counter (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the packed 64-bit representation.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("EntityId(null)")
        } else {
            write!(f, "EntityId({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index(), self.generation())
    }
}

/// Something that carries transient per-tick state and can clear it.
///
/// `reset` must only touch the entity's own state. It is never called
/// concurrently for the same instance: the caller always holds the
/// entity's [`EntityCell`] lock.
pub trait Resettable: Send + 'static {
    /// Why a reset can fail.
    type Error: fmt::Display;

    /// Clears the transient state accumulated during the last tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is in a state it cannot recover
    /// from. The caller removes such an entity from the simulation.
    fn reset(&mut self) -> Result<(), Self::Error>;
}

/// Entity-scoped exclusive access wrapper.
///
/// One cell per entity. Unrelated entities reset fully in parallel; the
/// same entity never does.
pub struct EntityCell<E> {
    /// Identity, fixed for the lifetime of the cell.
    id: EntityId,
    /// The entity state, behind its own lock.
    state: Mutex<E>,
}

impl<E> EntityCell<E> {
    /// Wraps an entity with the given identity.
    #[must_use]
    pub fn new(id: EntityId, entity: E) -> Self {
        Self {
            id,
            state: Mutex::new(entity),
        }
    }

    /// Returns the entity's identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Locks the entity for exclusive access, blocking until available.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, E> {
        self.state.lock()
    }

    /// Tries to lock the entity without blocking.
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, E>> {
        self.state.try_lock()
    }

    /// Returns whether some thread currently holds the entity lock.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    /// Consumes the cell and returns the entity.
    #[must_use]
    pub fn into_inner(self) -> E {
        self.state.into_inner()
    }
}

impl<E> fmt::Debug for EntityCell<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCell")
            .field("id", &self.id)
            .field("locked", &self.is_locked())
            .finish()
    }
}
