//! # Archetype registry
//!
//! An archetype is the exact, sorted set of component types an entity carries.
//! It fixes the memory layout of every chunk that stores such entities and
//! owns the doubly-linked list of those chunks.
//!
//! ## Identity
//!
//! [`ArchetypeStore::get_or_create`] canonicalises its input (sort by type
//! index, drop duplicates, make sure the `Entity` column is present) and looks
//! the result up in a hash map. Set-equal inputs in any order therefore map to
//! the same [`ArchetypeId`]. Archetypes are never destroyed, so ids and cached
//! group matches stay valid for the lifetime of the world.
//!
//! ## Layout
//!
//! Columns are packed in ascending type-index order, `Entity` first:
//!
//! ```text
//! row_size = Σ stride(type)            (tags, shared and buffer types: 0)
//! capacity = floor(chunk_bytes / row_size)
//! while aligned column layout > chunk_bytes { capacity -= 1 }
//! ```
//!
//! A capacity of zero means a single row does not fit; this is reported as a
//! [`ChunkCapacityError`] when the archetype is created and is never retried.
//!
//! ## Chunk list
//!
//! Chunks are appended at the tail as entities are added. An archetype also
//! tracks which of its chunks still have room so that placement does not have
//! to walk the full list. A chunk whose count drops to zero is unlinked and
//! returned to the [`ChunkPool`].

use std::collections::HashMap;

use crate::engine::chunk::ChunkPool;
use crate::engine::component::{ComponentDesc, ComponentRegistry};
use crate::engine::error::{ChunkCapacityError, EcsError};
use crate::engine::types::{
    ArchetypeId, ChunkId, ComponentCategory, TypeIndex, ENTITY_TYPE_INDEX,
};


/// Derived, immutable memory layout of an archetype.
#[derive(Clone, Debug)]
pub struct ArchetypeLayout {
    /// Sorted type indices; `types[0]` is always the entity column.
    pub types: Vec<TypeIndex>,

    /// Descriptor of each type, parallel to `types`.
    pub descs: Vec<ComponentDesc>,

    /// Byte offset of each data column inside the chunk arena (0 for
    /// non-data types).
    pub offsets: Vec<usize>,

    /// Per-row stride of each column (0 for non-data types).
    pub strides: Vec<usize>,

    /// Sum of all strides.
    pub row_size: usize,

    /// Entities per chunk.
    pub capacity: usize,

    /// For each type position, the shared-value slot it occupies.
    pub shared_slot: Vec<Option<usize>>,

    /// For each type position, the buffer slot it occupies.
    pub buffer_slot: Vec<Option<usize>>,

    /// Number of shared types.
    pub shared_count: usize,

    /// Number of buffer types.
    pub buffer_count: usize,

    /// Contains the built-in `Disabled` tag.
    pub disabled: bool,

    /// Contains the built-in `Prefab` tag.
    pub prefab: bool,
}

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

impl ArchetypeLayout {
    /// Computes the layout of the canonical type list `types`.
    pub fn compute(
        registry: &ComponentRegistry,
        types: Vec<TypeIndex>,
        chunk_bytes: usize,
    ) -> Result<Self, EcsError> {
        debug_assert_eq!(types.first(), Some(&ENTITY_TYPE_INDEX));

        let descs = types
            .iter()
            .map(|&t| registry.desc(t).copied())
            .collect::<Result<Vec<_>, _>>()?;
        let strides: Vec<usize> = descs.iter().map(ComponentDesc::chunk_stride).collect();
        let row_size: usize = strides.iter().sum();

        let mut capacity = chunk_bytes / row_size;
        while capacity > 0 && Self::arena_bytes(&descs, &strides, capacity) > chunk_bytes {
            capacity -= 1;
        }
        if capacity == 0 {
            let largest = descs
                .iter()
                .max_by_key(|d| d.chunk_stride())
                .map(|d| d.name)
                .unwrap_or("Entity");
            return Err(ChunkCapacityError { type_name: largest, size: row_size, chunk_bytes }.into());
        }

        let mut offsets = vec![0; types.len()];
        let mut cursor = 0;
        for (position, desc) in descs.iter().enumerate() {
            if strides[position] == 0 {
                continue;
            }
            cursor = align_up(cursor, desc.align);
            offsets[position] = cursor;
            cursor += capacity * strides[position];
        }

        let mut shared_slot = vec![None; types.len()];
        let mut buffer_slot = vec![None; types.len()];
        let (mut shared_count, mut buffer_count) = (0, 0);
        for (position, desc) in descs.iter().enumerate() {
            match desc.category {
                ComponentCategory::Shared => {
                    shared_slot[position] = Some(shared_count);
                    shared_count += 1;
                }
                ComponentCategory::Buffer => {
                    buffer_slot[position] = Some(buffer_count);
                    buffer_count += 1;
                }
                _ => {}
            }
        }

        let disabled = types.contains(&registry.disabled_index());
        let prefab = types.contains(&registry.prefab_index());

        Ok(Self {
            types,
            descs,
            offsets,
            strides,
            row_size,
            capacity,
            shared_slot,
            buffer_slot,
            shared_count,
            buffer_count,
            disabled,
            prefab,
        })
    }

    fn arena_bytes(descs: &[ComponentDesc], strides: &[usize], capacity: usize) -> usize {
        descs.iter().zip(strides).fold(0, |cursor, (desc, &stride)| {
            if stride == 0 { cursor } else { align_up(cursor, desc.align) + capacity * stride }
        })
    }

    /// Position of `type_index` in this layout.
    #[inline]
    pub fn position_of(&self, type_index: TypeIndex) -> Option<usize> {
        self.types.binary_search(&type_index).ok()
    }

    /// Returns `true` if the archetype contains `type_index`.
    #[inline]
    pub fn contains(&self, type_index: TypeIndex) -> bool {
        self.position_of(type_index).is_some()
    }
}

/// A registered archetype and the head of its chunk list.
pub struct Archetype {
    id: ArchetypeId,
    layout: ArchetypeLayout,
    first_chunk: Option<ChunkId>,
    last_chunk: Option<ChunkId>,
    chunk_count: usize,
    entity_count: usize,
    free_chunks: Vec<ChunkId>,
}

impl Archetype {
    /// Id of this archetype.
    #[inline] pub fn id(&self) -> ArchetypeId { self.id }
    /// Chunk layout.
    #[inline] pub fn layout(&self) -> &ArchetypeLayout { &self.layout }
    /// Sorted type indices.
    #[inline] pub fn types(&self) -> &[TypeIndex] { &self.layout.types }
    /// Entities per chunk.
    #[inline] pub fn capacity(&self) -> usize { self.layout.capacity }
    /// Live entities across all chunks.
    #[inline] pub fn entity_count(&self) -> usize { self.entity_count }
    /// Live chunks.
    #[inline] pub fn chunk_count(&self) -> usize { self.chunk_count }
    /// Head of the chunk list.
    #[inline] pub fn first_chunk(&self) -> Option<ChunkId> { self.first_chunk }
    /// Tail of the chunk list.
    #[inline] pub fn last_chunk(&self) -> Option<ChunkId> { self.last_chunk }

    /// Chunk ids in list order.
    pub fn chunk_ids(&self, pool: &ChunkPool) -> Vec<ChunkId> {
        let mut ids = Vec::with_capacity(self.chunk_count);
        let mut cursor = self.first_chunk;
        while let Some(id) = cursor {
            ids.push(id);
            cursor = pool.chunk(id).next;
        }
        ids
    }

    fn link_tail(&mut self, pool: &mut ChunkPool, id: ChunkId) {
        pool.chunk_mut(id).prev = self.last_chunk;
        match self.last_chunk {
            Some(tail) => pool.chunk_mut(tail).next = Some(id),
            None => self.first_chunk = Some(id),
        }
        self.last_chunk = Some(id);
        self.chunk_count += 1;
    }

    fn unlink(&mut self, pool: &mut ChunkPool, id: ChunkId) {
        let (prev, next) = {
            let chunk = pool.chunk(id);
            (chunk.prev, chunk.next)
        };
        match prev {
            Some(p) => pool.chunk_mut(p).next = next,
            None => self.first_chunk = next,
        }
        match next {
            Some(n) => pool.chunk_mut(n).prev = prev,
            None => self.last_chunk = prev,
        }
        self.chunk_count -= 1;
    }
}

/// Append-only table of archetypes keyed by their canonical type list.
#[derive(Default)]
pub struct ArchetypeStore {
    archetypes: Vec<Archetype>,
    by_types: HashMap<Vec<TypeIndex>, ArchetypeId>,
}

impl ArchetypeStore {
    /// Creates an empty store.
    pub fn new() -> Self { Self::default() }

    /// Number of archetypes.
    pub fn len(&self) -> usize { self.archetypes.len() }

    /// Returns `true` when no archetype exists yet.
    pub fn is_empty(&self) -> bool { self.archetypes.is_empty() }

    /// Archetype `id`.
    #[inline]
    pub fn get(&self, id: ArchetypeId) -> &Archetype { &self.archetypes[id as usize] }

    /// All archetypes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> { self.archetypes.iter() }

    /// Canonicalises `types`: sorted, deduplicated, `Entity` first.
    pub fn canonical_types(types: &[TypeIndex]) -> Vec<TypeIndex> {
        let mut canonical = Vec::with_capacity(types.len() + 1);
        canonical.push(ENTITY_TYPE_INDEX);
        canonical.extend_from_slice(types);
        canonical.sort_unstable();
        canonical.dedup();
        canonical
    }

    /// Looks up an archetype by its exact type set without creating it.
    pub fn find(&self, types: &[TypeIndex]) -> Option<ArchetypeId> {
        self.by_types.get(&Self::canonical_types(types)).copied()
    }

    /// Returns the archetype for `types`, creating it on first use.
    ///
    /// The boolean is `true` when the archetype was created by this call; the
    /// caller must then announce it to the group manager.
    pub fn get_or_create(
        &mut self,
        registry: &ComponentRegistry,
        types: &[TypeIndex],
        chunk_bytes: usize,
    ) -> Result<(ArchetypeId, bool), EcsError> {
        let canonical = Self::canonical_types(types);
        if let Some(&id) = self.by_types.get(&canonical) {
            return Ok((id, false));
        }

        let layout = ArchetypeLayout::compute(registry, canonical.clone(), chunk_bytes)?;
        let id = self.archetypes.len() as ArchetypeId;
        log::debug!(
            "created archetype {} types={:?} row_size={} capacity={}",
            id, layout.types, layout.row_size, layout.capacity
        );

        self.archetypes.push(Archetype {
            id,
            layout,
            first_chunk: None,
            last_chunk: None,
            chunk_count: 0,
            entity_count: 0,
            free_chunks: Vec::new(),
        });
        self.by_types.insert(canonical, id);
        Ok((id, true))
    }

    /// Returns a chunk of `archetype` with room for one more entity whose
    /// shared value indices equal `shared_values`, allocating one if needed.
    pub fn find_or_allocate_chunk(
        &mut self,
        pool: &mut ChunkPool,
        archetype: ArchetypeId,
        shared_values: &[u32],
    ) -> ChunkId {
        let arch = &mut self.archetypes[archetype as usize];
        if let Some(&id) = arch
            .free_chunks
            .iter()
            .find(|&&id| pool.chunk(id).shared_values() == shared_values)
        {
            return id;
        }

        let id = pool.allocate(archetype, &arch.layout, shared_values);
        arch.link_tail(pool, id);
        arch.free_chunks.push(id);
        id
    }

    /// Books a row that was just pushed into `chunk`.
    pub fn on_row_added(&mut self, pool: &ChunkPool, archetype: ArchetypeId, chunk: ChunkId) {
        let arch = &mut self.archetypes[archetype as usize];
        arch.entity_count += 1;
        if pool.chunk(chunk).is_full() {
            arch.free_chunks.retain(|&c| c != chunk);
        }
    }

    /// Books a row that was just removed from `chunk`; frees the chunk once
    /// it is empty.
    pub fn on_row_removed(&mut self, pool: &mut ChunkPool, archetype: ArchetypeId, chunk: ChunkId) {
        let arch = &mut self.archetypes[archetype as usize];
        arch.entity_count -= 1;

        let count = pool.chunk(chunk).count();
        if count == 0 {
            arch.free_chunks.retain(|&c| c != chunk);
            arch.unlink(pool, chunk);
            pool.free(chunk);
        } else if count + 1 == arch.layout.capacity {
            arch.free_chunks.push(chunk);
        }
    }
}
