//! Entity handles and the entity location table.
//!
//! An [`Entity`] is an opaque `(index, version)` pair. The index addresses a
//! slot in [`EntityStore`]; the version is bumped whenever the slot is freed so
//! that old handles are detected as stale instead of silently aliasing a newly
//! created entity.
//!
//! The store also keeps each live entity's [`EntityLocation`] (archetype,
//! chunk, row). This is what makes per-entity random access O(1) regardless of
//! iteration order, and it must be updated every time a structural change or a
//! swap-removal moves a row.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::engine::error::StaleEntityError;
use crate::engine::types::{ArchetypeId, ChunkId, RowId};


/// Opaque entity identifier.
///
/// Stored verbatim in the implicit first column of every chunk, hence `Pod`.

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Pod, Zeroable)]
pub struct Entity {
    index: u32,
    version: u32,
}

impl Entity {
    /// Slot index within the entity store.
    #[inline] pub fn index(self) -> u32 { self.index }

    /// Generation of the slot when this handle was issued.
    #[inline] pub fn version(self) -> u32 { self.version }

    /// Packs the handle into a single `u64` (version in the high half).
    #[inline]
    pub fn to_bits(self) -> u64 {
        ((self.version as u64) << 32) | self.index as u64
    }

    /// Inverse of [`Entity::to_bits`].
    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        Self { index: bits as u32, version: (bits >> 32) as u32 }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.version)
    }
}

/// Physical position of a live entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype the entity currently belongs to.
    pub archetype: ArchetypeId,
    /// Chunk holding the entity's row.
    pub chunk: ChunkId,
    /// Row inside the chunk.
    pub row: RowId,
}

/// Slot table mapping entity handles to their current location.
#[derive(Default)]
pub struct EntityStore {
    versions: Vec<u32>,
    alive: Vec<bool>,
    locations: Vec<EntityLocation>,
    free_store: Vec<u32>,
    live: usize,
}

impl EntityStore {
    /// Creates an empty store.
    pub fn new() -> Self { Self::default() }

    /// Number of live entities.
    #[inline]
    pub fn live_count(&self) -> usize { self.live }

    /// Allocates a handle for an entity stored at `location`.
    ///
    /// Freed slots are reused last-in first-out; their version was bumped when
    /// they were freed, so the new handle differs from every earlier one.

    pub fn allocate(&mut self, location: EntityLocation) -> Entity {
        let index = match self.free_store.pop() {
            Some(index) => index,
            None => {
                let index = self.versions.len() as u32;
                self.versions.push(1);
                self.alive.push(false);
                self.locations.push(EntityLocation::default());
                index
            }
        };

        let slot = index as usize;
        self.alive[slot] = true;
        self.locations[slot] = location;
        self.live += 1;
        Entity { index, version: self.versions[slot] }
    }

    /// Frees the slot of `entity`.
    pub fn free(&mut self, entity: Entity) -> Result<(), StaleEntityError> {
        if !self.is_alive(entity) {
            return Err(StaleEntityError { entity });
        }
        let slot = entity.index as usize;
        self.versions[slot] = self.versions[slot].wrapping_add(1).max(1);
        self.alive[slot] = false;
        self.locations[slot] = EntityLocation::default();
        self.free_store.push(entity.index);
        self.live -= 1;
        Ok(())
    }

    /// Returns `true` if `entity` refers to a live slot with a matching version.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index as usize;
        slot < self.versions.len() && self.alive[slot] && self.versions[slot] == entity.version
    }

    /// Current location of `entity`.
    #[inline]
    pub fn location(&self, entity: Entity) -> Result<EntityLocation, StaleEntityError> {
        if self.is_alive(entity) {
            Ok(self.locations[entity.index as usize])
        } else {
            Err(StaleEntityError { entity })
        }
    }

    /// Records a new location for a live entity.
    pub fn set_location(&mut self, entity: Entity, location: EntityLocation) {
        debug_assert!(
            self.is_alive(entity),
            "set_location called on a dead or stale entity {entity} -> {location:?}"
        );
        if let Some(slot) = self.locations.get_mut(entity.index as usize) {
            *slot = location;
        }
    }
}
