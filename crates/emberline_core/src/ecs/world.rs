//! # World Registry
//!
//! The owner of every active entity. Entities live in fixed slots; freed
//! slots are reused with a bumped generation so stale [`EntityId`]s never
//! alias a newer entity.
//!
//! The slot table is behind a `parking_lot::RwLock`: the dispatcher takes
//! one snapshot per tick, while reset workers may call
//! [`EntityRegistry::unregister`] concurrently from any thread.

use std::sync::Arc;

use parking_lot::RwLock;

use super::entity::{EntityCell, EntityId};
use crate::config::ResetConfig;
use crate::error::WorldError;

/// The registry capability a reset task needs on its failure path.
///
/// Implementations must be safe to call from many worker threads at once.
pub trait EntityRegistry: Send + Sync + 'static {
    /// Removes an entity from the active simulation.
    ///
    /// Returns `true` if the entity was registered, `false` if it was
    /// unknown or already removed.
    fn unregister(&self, id: EntityId) -> bool;
}

/// Slot table guarded by the world's lock.
struct Slots<E> {
    /// Entity cells indexed by slot.
    cells: Vec<Option<Arc<EntityCell<E>>>>,
    /// Current generation of each slot.
    generations: Vec<u32>,
    /// Free list - indices of empty slots.
    free: Vec<u32>,
    /// Number of occupied slots.
    live: usize,
}

impl<E> Slots<E> {
    fn cell(&self, id: EntityId) -> Option<&Arc<EntityCell<E>>> {
        self.cells
            .get(id.index() as usize)?
            .as_ref()
            .filter(|cell| cell.id() == id)
    }
}

/// The world registry - container for all active entities.
pub struct World<E> {
    /// The slot table.
    slots: RwLock<Slots<E>>,
    /// Maximum number of live entities.
    capacity: usize,
}

impl<E> World<E> {
    /// Creates an empty world that can hold `capacity` live entities.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");

        let initial = capacity.min(1024);
        Self {
            slots: RwLock::new(Slots {
                cells: Vec::with_capacity(initial),
                generations: Vec::with_capacity(initial),
                free: Vec::new(),
                live: 0,
            }),
            capacity,
        }
    }

    /// Creates an empty world sized by `config.max_entities`.
    #[must_use]
    pub fn with_config(config: &ResetConfig) -> Self {
        Self::new(config.max_entities)
    }

    /// Adds an entity to the simulation and returns its identity.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Full`] if the world is at capacity.
    pub fn register(&self, entity: E) -> Result<EntityId, WorldError> {
        let mut slots = self.slots.write();
        if slots.live >= self.capacity {
            return Err(WorldError::Full {
                capacity: self.capacity,
            });
        }

        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(slots.cells.len()).map_err(|_| WorldError::Full {
                    capacity: self.capacity,
                })?;
                slots.cells.push(None);
                slots.generations.push(0);
                index
            }
        };

        let id = EntityId::new(index, slots.generations[index as usize]);
        slots.cells[index as usize] = Some(Arc::new(EntityCell::new(id, entity)));
        slots.live += 1;
        Ok(id)
    }

    /// Removes an entity and returns its cell.
    ///
    /// Returns `None` if `id` is unknown or stale. Any task still holding
    /// the cell finishes normally; the entity is simply no longer part of
    /// the next snapshot.
    pub fn remove(&self, id: EntityId) -> Option<Arc<EntityCell<E>>> {
        let mut slots = self.slots.write();
        slots.cell(id)?;

        let index = id.index() as usize;
        let cell = slots.cells[index].take();
        slots.generations[index] = slots.generations[index].wrapping_add(1);
        slots.free.push(id.index());
        slots.live -= 1;
        cell
    }

    /// Returns the cell of a live entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Arc<EntityCell<E>>> {
        self.slots.read().cell(id).cloned()
    }

    /// Returns true if `id` names a live entity.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.slots.read().cell(id).is_some()
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().live
    }

    /// Returns true if no entity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of live entities.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshots the active entities in slot order.
    ///
    /// Taken once per tick by the dispatcher; entities registered or
    /// removed afterwards do not affect the snapshot.
    #[must_use]
    pub fn active(&self) -> Vec<Arc<EntityCell<E>>> {
        self.slots.read().cells.iter().flatten().cloned().collect()
    }

    /// Returns the ids of all active entities in slot order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.slots
            .read()
            .cells
            .iter()
            .flatten()
            .map(|cell| cell.id())
            .collect()
    }

    /// Runs `f` on every active entity, locking each one in turn.
    ///
    /// Main-thread iteration for tick logic. Must not run while a reset
    /// phase is in flight.
    pub fn for_each_active<F>(&self, mut f: F)
    where
        F: FnMut(EntityId, &mut E),
    {
        for cell in self.active() {
            let mut entity = cell.lock();
            f(cell.id(), &mut entity);
        }
    }
}

impl<E: Send + 'static> EntityRegistry for World<E> {
    fn unregister(&self, id: EntityId) -> bool {
        self.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_register_and_get() {
        let world = World::new(8);
        let id = world.register(10u32).unwrap();

        assert_eq!(world.len(), 1);
        assert!(world.contains(id));
        assert_eq!(*world.get(id).unwrap().lock(), 10);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let world = World::new(2);
        world.register(1u32).unwrap();
        world.register(2u32).unwrap();

        assert_eq!(world.register(3u32), Err(WorldError::Full { capacity: 2 }));
    }

    #[test]
    fn test_remove_reuses_slot_with_new_generation() {
        let world = World::new(4);
        let first = world.register(1u32).unwrap();

        assert!(world.remove(first).is_some());
        assert!(!world.contains(first));
        assert!(world.is_empty());

        let second = world.register(2u32).unwrap();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(!world.contains(first));
        assert!(world.remove(first).is_none());
        assert!(world.contains(second));
    }

    #[test]
    fn test_unregister_unknown_id() {
        let world: World<u32> = World::new(4);
        assert!(!world.unregister(EntityId::new(3, 0)));
        assert!(!world.unregister(EntityId::NULL));
    }

    #[test]
    fn test_active_snapshot_in_slot_order() {
        let world = World::new(8);
        let ids: Vec<_> = (0..5u32).map(|v| world.register(v).unwrap()).collect();
        world.remove(ids[2]);

        let snapshot: Vec<_> = world.active().iter().map(|cell| cell.id()).collect();
        assert_eq!(snapshot, vec![ids[0], ids[1], ids[3], ids[4]]);
        assert_eq!(world.ids(), snapshot);
    }

    #[test]
    fn test_for_each_active_mutates() {
        let world = World::new(8);
        for v in 0..4u32 {
            world.register(v).unwrap();
        }

        world.for_each_active(|_, value| *value *= 10);

        let values: Vec<u32> = world.active().iter().map(|cell| *cell.lock()).collect();
        assert_eq!(values, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_concurrent_unregister() {
        let world = Arc::new(World::new(256));
        let ids: Vec<_> = (0..200u32).map(|v| world.register(v).unwrap()).collect();

        let handles: Vec<_> = ids
            .chunks(25)
            .map(|chunk| {
                let world = Arc::clone(&world);
                let chunk = chunk.to_vec();
                thread::spawn(move || chunk.into_iter().filter(|id| world.unregister(*id)).count())
            })
            .collect();

        let removed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(removed, 200);
        assert!(world.is_empty());
    }
}
