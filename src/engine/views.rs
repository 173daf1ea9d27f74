//! # Typed views
//!
//! Thin, type-safe façades over [`ComponentChunkIterator`]. Each view presents
//! one column of a group as a flat array:
//!
//! | View | Element | Access |
//! |------|---------|--------|
//! | [`ComponentDataArray`] | `T: Component` | read, or read/write |
//! | [`EntityArray`] | [`Entity`] | read |
//! | [`SharedComponentDataArray`] | `&S` | read |
//! | [`BufferArray`] | [`DynamicBuffer<T>`] | read/write |
//! | [`ComponentDataFromEntity`] | `T` by entity id | read, or read/write |
//! | [`ArchetypeChunkArray`] | whole chunks | read |
//!
//! ## Length
//!
//! A view's length is computed once, at construction. Views are snapshots of
//! shape: they borrow the world, so no structural change can happen while one
//! is alive anyway.
//!
//! ## Cache and versions
//!
//! A view remembers the [`ChunkCache`] of the chunk it last touched. An index
//! inside `[begin_index, end_index)` is served straight from that chunk; any
//! other index goes back to the iterator. Writes stamp the column with the
//! global system version. A write that lands in a range which was cached for
//! reading stamps the version first, so reading and then writing the same
//! chunk is still recorded as a change.

use std::any::type_name;
use std::marker::PhantomData;

use crate::engine::archetype::{ArchetypeLayout, ArchetypeStore};
use crate::engine::buffer::{cell_slice, BufferAlias, DynamicBuffer};
use crate::engine::chunk::{Chunk, ChunkPool};
use crate::engine::component::{BufferElement, Component, ComponentRegistry, SharedComponent};
use crate::engine::entity::{Entity, EntityStore};
use crate::engine::error::{
    AccessError, ComponentNotInGroupError, EcsError, EcsResult, IndexOutOfRangeError,
    MissingComponentError, RegistryError, StaleViewError,
};
use crate::engine::iterator::{ChunkCache, ComponentChunkIterator};
use crate::engine::safety::SafetyHandle;
use crate::engine::shared::SharedComponentStore;
use crate::engine::types::{did_change, ArchetypeId, ChunkId, RowId, TypeIndex, Version};


/// Shared or exclusive borrow of the chunk pool.
pub(crate) enum PoolRef<'w> {
    Shared(&'w ChunkPool),
    Exclusive(&'w mut ChunkPool),
}

impl<'w> PoolRef<'w> {
    #[inline]
    fn get(&self) -> &ChunkPool {
        match self {
            PoolRef::Shared(pool) => *pool,
            PoolRef::Exclusive(pool) => &**pool,
        }
    }

    #[inline]
    fn get_mut(&mut self) -> Option<&mut ChunkPool> {
        match self {
            PoolRef::Shared(_) => None,
            PoolRef::Exclusive(pool) => Some(&mut **pool),
        }
    }
}

#[inline]
fn check_index(index: usize, length: usize) -> Result<(), IndexOutOfRangeError> {
    if index >= length {
        return Err(IndexOutOfRangeError { index, length });
    }
    Ok(())
}

/// Read-side cache lookup shared by every view.
fn resolve_read(
    iterator: &mut ComponentChunkIterator<'_>,
    pool: &ChunkPool,
    cache: &mut Option<ChunkCache>,
    index_in_group: usize,
    index: usize,
    length: usize,
) -> EcsResult<ChunkCache> {
    check_index(index, length)?;
    if let Some(cached) = cache {
        if cached.contains(index) {
            return Ok(*cached);
        }
    }
    iterator.move_to_entity_index(pool, index)?;
    let resolved = iterator.update_cache_to_current_chunk(pool, index_in_group)?;
    *cache = Some(resolved);
    Ok(resolved)
}

/// Write-side cache lookup shared by every writable view.
fn resolve_write(
    iterator: &mut ComponentChunkIterator<'_>,
    pool: &mut ChunkPool,
    cache: &mut Option<ChunkCache>,
    index_in_group: usize,
    index: usize,
    length: usize,
) -> EcsResult<ChunkCache> {
    check_index(index, length)?;
    if let Some(cached) = cache.as_mut() {
        if cached.contains(index) {
            if !cached.written {
                pool.chunk_mut(cached.chunk)
                    .set_change_version(cached.position, iterator.global_system_version());
                cached.written = true;
            }
            return Ok(*cached);
        }
    }
    iterator.move_to_entity_index(pool, index)?;
    let resolved = iterator.update_cache_to_current_chunk_for_write(pool, index_in_group)?;
    *cache = Some(resolved);
    Ok(resolved)
}

/// Flat array view over one plain-data column of a group.
pub struct ComponentDataArray<'w, T: Component> {
    iterator: ComponentChunkIterator<'w>,
    archetypes: &'w ArchetypeStore,
    pool: PoolRef<'w>,
    index_in_group: usize,
    type_index: TypeIndex,
    read_only: bool,
    length: usize,
    cache: Option<ChunkCache>,
    _marker: PhantomData<T>,
}

impl<'w, T: Component> ComponentDataArray<'w, T> {
    pub(crate) fn new(
        iterator: ComponentChunkIterator<'w>,
        archetypes: &'w ArchetypeStore,
        pool: PoolRef<'w>,
        index_in_group: usize,
        type_index: TypeIndex,
        read_only: bool,
    ) -> Self {
        let length = iterator.calculate_length(pool.get());
        Self {
            iterator,
            archetypes,
            pool,
            index_in_group,
            type_index,
            read_only,
            length,
            cache: None,
            _marker: PhantomData,
        }
    }

    /// Number of elements at construction.
    #[inline]
    pub fn len(&self) -> usize { self.length }

    /// Returns `true` when the view has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool { self.length == 0 }

    /// Returns `true` when writes are rejected.
    #[inline]
    pub fn is_read_only(&self) -> bool { self.read_only }

    #[inline]
    fn layout(&self, archetype: ArchetypeId) -> &'w ArchetypeLayout {
        self.archetypes.get(archetype).layout()
    }

    fn write_cache(&mut self, index: usize) -> EcsResult<ChunkCache> {
        let type_index = self.type_index;
        if self.read_only {
            return Err(AccessError::ReadOnly { type_index }.into());
        }
        let pool = self.pool.get_mut().ok_or(AccessError::ReadOnly { type_index })?;
        resolve_write(&mut self.iterator, pool, &mut self.cache, self.index_in_group, index, self.length)
    }

    /// Value at flat `index`.
    pub fn get(&mut self, index: usize) -> EcsResult<T> {
        let cache = resolve_read(
            &mut self.iterator,
            self.pool.get(),
            &mut self.cache,
            self.index_in_group,
            index,
            self.length,
        )?;
        let layout = self.layout(cache.archetype);
        Ok(*self.pool.get().chunk(cache.chunk).element::<T>(layout, cache.position, cache.row(index)))
    }

    /// Mutable reference to the value at flat `index`; stamps the chunk.
    pub fn get_mut(&mut self, index: usize) -> EcsResult<&mut T> {
        let cache = self.write_cache(index)?;
        let layout = self.layout(cache.archetype);
        let pool = self.pool.get_mut().ok_or(AccessError::ReadOnly { type_index: self.type_index })?;
        Ok(pool.chunk_mut(cache.chunk).element_mut::<T>(layout, cache.position, cache.row(index)))
    }

    /// Stores `value` at flat `index`; stamps the chunk.
    pub fn set(&mut self, index: usize, value: T) -> EcsResult<()> {
        *self.get_mut(index)? = value;
        Ok(())
    }

    /// Copies every element in flat order.
    pub fn to_vec(&mut self) -> EcsResult<Vec<T>> {
        (0..self.length).map(|i| self.get(i)).collect()
    }
}

/// Flat array view over the entity ids of a group.
pub struct EntityArray<'w> {
    iterator: ComponentChunkIterator<'w>,
    archetypes: &'w ArchetypeStore,
    pool: &'w ChunkPool,
    length: usize,
    cache: Option<ChunkCache>,
}

impl<'w> EntityArray<'w> {
    pub(crate) fn new(iterator: ComponentChunkIterator<'w>, archetypes: &'w ArchetypeStore, pool: &'w ChunkPool) -> Self {
        let length = iterator.calculate_length(pool);
        Self { iterator, archetypes, pool, length, cache: None }
    }

    /// Number of entities at construction.
    #[inline]
    pub fn len(&self) -> usize { self.length }

    /// Returns `true` when the view has no entities.
    #[inline]
    pub fn is_empty(&self) -> bool { self.length == 0 }

    /// Entity at flat `index`.
    pub fn get(&mut self, index: usize) -> EcsResult<Entity> {
        // The entity column is always entry 0 of a group's required list.
        let cache = resolve_read(&mut self.iterator, self.pool, &mut self.cache, 0, index, self.length)?;
        let layout = self.archetypes.get(cache.archetype).layout();
        Ok(self.pool.chunk(cache.chunk).entity_at(layout, cache.row(index)))
    }

    /// Every entity in flat order.
    pub fn to_vec(&mut self) -> EcsResult<Vec<Entity>> {
        (0..self.length).map(|i| self.get(i)).collect()
    }
}

/// Flat array view over a shared component of a group.
pub struct SharedComponentDataArray<'w, S: SharedComponent> {
    iterator: ComponentChunkIterator<'w>,
    archetypes: &'w ArchetypeStore,
    pool: &'w ChunkPool,
    shared: &'w SharedComponentStore,
    index_in_group: usize,
    type_index: TypeIndex,
    length: usize,
    cache: Option<ChunkCache>,
    _marker: PhantomData<S>,
}

impl<'w, S: SharedComponent> SharedComponentDataArray<'w, S> {
    pub(crate) fn new(
        iterator: ComponentChunkIterator<'w>,
        archetypes: &'w ArchetypeStore,
        pool: &'w ChunkPool,
        shared: &'w SharedComponentStore,
        index_in_group: usize,
        type_index: TypeIndex,
    ) -> Self {
        let length = iterator.calculate_length(pool);
        Self {
            iterator,
            archetypes,
            pool,
            shared,
            index_in_group,
            type_index,
            length,
            cache: None,
            _marker: PhantomData,
        }
    }

    /// Number of elements at construction.
    #[inline]
    pub fn len(&self) -> usize { self.length }

    /// Returns `true` when the view has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool { self.length == 0 }

    /// Shared value index of the chunk holding flat `index`.
    pub fn value_index(&mut self, index: usize) -> EcsResult<u32> {
        let cache = resolve_read(
            &mut self.iterator,
            self.pool,
            &mut self.cache,
            self.index_in_group,
            index,
            self.length,
        )?;
        let layout = self.archetypes.get(cache.archetype).layout();
        let slot = layout.shared_slot[cache.position]
            .ok_or(RegistryError::CategoryMismatch { name: type_name::<S>() })?;
        Ok(self.pool.chunk(cache.chunk).shared_value(slot))
    }

    /// Shared value of the entity at flat `index`.
    pub fn get(&mut self, index: usize) -> EcsResult<&'w S> {
        let value_index = self.value_index(index)?;
        let shared: &'w SharedComponentStore = self.shared;
        Ok(shared.get::<S>(self.type_index, value_index)?)
    }
}

/// Resolves a buffer alias against the current storage.
pub(crate) fn resolve_alias<'a, T: BufferElement>(
    pool: &'a ChunkPool,
    archetypes: &ArchetypeStore,
    safety: SafetyHandle,
    alias: &BufferAlias,
) -> EcsResult<&'a [T]> {
    let stale = |found| EcsError::from(StaleViewError { expected: alias.safety_version, found });

    let chunk = pool.get(alias.chunk).ok_or_else(|| stale(0))?;
    let row = alias.row as usize;
    if row >= chunk.count() {
        return Err(stale(0));
    }
    let layout = archetypes.get(chunk.archetype()).layout();
    if alias.slot >= layout.buffer_count || chunk.entity_at(layout, row) != alias.entity {
        return Err(stale(0));
    }

    let cell = chunk.buffer_cell(alias.slot, row);
    safety.check_alias(alias, cell)?;
    Ok(cell_slice(cell))
}

/// Flat array view over a buffer column of a group.
pub struct BufferArray<'w, T: BufferElement> {
    iterator: ComponentChunkIterator<'w>,
    archetypes: &'w ArchetypeStore,
    pool: &'w mut ChunkPool,
    safety: SafetyHandle,
    index_in_group: usize,
    length: usize,
    cache: Option<ChunkCache>,
    _marker: PhantomData<T>,
}

impl<'w, T: BufferElement> BufferArray<'w, T> {
    pub(crate) fn new(
        iterator: ComponentChunkIterator<'w>,
        archetypes: &'w ArchetypeStore,
        pool: &'w mut ChunkPool,
        safety: SafetyHandle,
        index_in_group: usize,
    ) -> Self {
        let length = iterator.calculate_length(pool);
        Self { iterator, archetypes, pool, safety, index_in_group, length, cache: None, _marker: PhantomData }
    }

    /// Number of buffers at construction.
    #[inline]
    pub fn len(&self) -> usize { self.length }

    /// Returns `true` when the view has no buffers.
    #[inline]
    pub fn is_empty(&self) -> bool { self.length == 0 }

    fn slot(layout: &ArchetypeLayout, position: usize) -> EcsResult<usize> {
        Ok(layout.buffer_slot[position].ok_or(RegistryError::CategoryMismatch { name: type_name::<T>() })?)
    }

    /// Mutable buffer of the entity at flat `index`; stamps the chunk.
    pub fn get(&mut self, index: usize) -> EcsResult<DynamicBuffer<'_, T>> {
        let cache = resolve_write(
            &mut self.iterator,
            self.pool,
            &mut self.cache,
            self.index_in_group,
            index,
            self.length,
        )?;
        let layout = self.archetypes.get(cache.archetype).layout();
        let slot = Self::slot(layout, cache.position)?;
        let row = cache.row(index);

        let chunk = self.pool.chunk_mut(cache.chunk);
        let entity = chunk.entity_at(layout, row);
        let cell = chunk.buffer_cell_mut(slot, row);
        Ok(DynamicBuffer::new(cell, Some((cache.chunk, slot, row as RowId, entity))))
    }

    /// Elements of the buffer at flat `index`, read-only.
    pub fn get_slice(&mut self, index: usize) -> EcsResult<&[T]> {
        let cache = resolve_read(
            &mut self.iterator,
            self.pool,
            &mut self.cache,
            self.index_in_group,
            index,
            self.length,
        )?;
        let layout = self.archetypes.get(cache.archetype).layout();
        let slot = Self::slot(layout, cache.position)?;
        Ok(cell_slice(self.pool.chunk(cache.chunk).buffer_cell(slot, cache.row(index))))
    }

    /// Detached alias of the buffer at flat `index`.
    pub fn alias(&mut self, index: usize) -> EcsResult<BufferAlias> {
        let cache = resolve_read(
            &mut self.iterator,
            self.pool,
            &mut self.cache,
            self.index_in_group,
            index,
            self.length,
        )?;
        let layout = self.archetypes.get(cache.archetype).layout();
        let slot = Self::slot(layout, cache.position)?;
        let row = cache.row(index);
        let chunk = self.pool.chunk(cache.chunk);
        Ok(BufferAlias {
            chunk: cache.chunk,
            slot,
            row: row as RowId,
            entity: chunk.entity_at(layout, row),
            safety_version: chunk.buffer_cell(slot, row).safety_version(),
        })
    }

    /// Reads through `alias`, failing if the buffer moved since it was taken.
    pub fn resolve_alias(&self, alias: &BufferAlias) -> EcsResult<&[T]> {
        resolve_alias(&*self.pool, self.archetypes, self.safety, alias)
    }
}

/// Random access to one component by entity id.
///
/// Lookups go through the entity location table and cost O(1) regardless of
/// iteration order.
pub struct ComponentDataFromEntity<'w, T: Component> {
    entities: &'w EntityStore,
    archetypes: &'w ArchetypeStore,
    pool: PoolRef<'w>,
    type_index: TypeIndex,
    version: Version,
    _marker: PhantomData<T>,
}

impl<'w, T: Component> ComponentDataFromEntity<'w, T> {
    pub(crate) fn new(
        entities: &'w EntityStore,
        archetypes: &'w ArchetypeStore,
        pool: PoolRef<'w>,
        type_index: TypeIndex,
        version: Version,
    ) -> Self {
        Self { entities, archetypes, pool, type_index, version, _marker: PhantomData }
    }

    fn locate(&self, entity: Entity) -> EcsResult<(ChunkId, usize, usize, &'w ArchetypeLayout)> {
        let location = self.entities.location(entity)?;
        let layout = self.archetypes.get(location.archetype).layout();
        let position = layout
            .position_of(self.type_index)
            .ok_or(MissingComponentError { entity, type_index: self.type_index })?;
        Ok((location.chunk, location.row as usize, position, layout))
    }

    /// Returns `true` if `entity` is alive and carries `T`.
    pub fn exists(&self, entity: Entity) -> bool {
        self.locate(entity).is_ok()
    }

    /// Value of `T` on `entity`.
    pub fn get(&self, entity: Entity) -> EcsResult<T> {
        let (chunk, row, position, layout) = self.locate(entity)?;
        Ok(*self.pool.get().chunk(chunk).element::<T>(layout, position, row))
    }

    /// Mutable value of `T` on `entity`; stamps the chunk.
    pub fn get_mut(&mut self, entity: Entity) -> EcsResult<&mut T> {
        let (chunk, row, position, layout) = self.locate(entity)?;
        let version = self.version;
        let pool = self.pool.get_mut().ok_or(AccessError::ReadOnly { type_index: self.type_index })?;
        let chunk = pool.chunk_mut(chunk);
        chunk.set_change_version(position, version);
        Ok(chunk.element_mut::<T>(layout, position, row))
    }

    /// Stores `value` on `entity`; stamps the chunk.
    pub fn set(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        *self.get_mut(entity)? = value;
        Ok(())
    }
}

fn column_position<T: 'static>(registry: &ComponentRegistry, layout: &ArchetypeLayout) -> EcsResult<(TypeIndex, usize)> {
    let type_index = registry.require::<T>()?;
    let position = layout
        .position_of(type_index)
        .ok_or(ComponentNotInGroupError { type_index, name: type_name::<T>() })?;
    Ok((type_index, position))
}

/// Read-only handle to one chunk.
#[derive(Clone, Copy)]
pub struct ArchetypeChunk<'w> {
    id: ChunkId,
    chunk: &'w Chunk,
    layout: &'w ArchetypeLayout,
    registry: &'w ComponentRegistry,
}

impl<'w> ArchetypeChunk<'w> {
    /// Chunk id.
    pub fn id(&self) -> ChunkId { self.id }

    /// Archetype of the chunk.
    pub fn archetype(&self) -> ArchetypeId { self.chunk.archetype() }

    /// Live rows.
    pub fn count(&self) -> usize { self.chunk.count() }

    /// Row capacity.
    pub fn capacity(&self) -> usize { self.chunk.capacity() }

    /// Entity ids of the live rows.
    pub fn entities(&self) -> &'w [Entity] { self.chunk.entities(self.layout) }

    /// Returns `true` if the archetype contains `T`.
    pub fn has<T: 'static>(&self) -> bool {
        column_position::<T>(self.registry, self.layout).is_ok()
    }

    /// Column of `T`.
    pub fn column<T: Component>(&self) -> EcsResult<&'w [T]> {
        let (_, position) = column_position::<T>(self.registry, self.layout)?;
        Ok(self.chunk.column(self.layout, position))
    }

    /// Change version of the column of `T`.
    pub fn change_version<T: 'static>(&self) -> EcsResult<Version> {
        let (_, position) = column_position::<T>(self.registry, self.layout)?;
        Ok(self.chunk.change_version(position))
    }

    /// Returns `true` if the column of `T` was written after `since`.
    pub fn did_change<T: 'static>(&self, since: Version) -> EcsResult<bool> {
        Ok(did_change(self.change_version::<T>()?, since))
    }

    /// Shared value index of `S` in this chunk.
    pub fn shared_value_index<S: SharedComponent>(&self) -> EcsResult<u32> {
        let (_, position) = column_position::<S>(self.registry, self.layout)?;
        let slot = self.layout.shared_slot[position]
            .ok_or(RegistryError::CategoryMismatch { name: type_name::<S>() })?;
        Ok(self.chunk.shared_value(slot))
    }

    /// Elements of the `T` buffer on `row`.
    pub fn buffer<T: BufferElement>(&self, row: usize) -> EcsResult<&'w [T]> {
        check_index(row, self.count())?;
        let (_, position) = column_position::<T>(self.registry, self.layout)?;
        let slot = self.layout.buffer_slot[position]
            .ok_or(RegistryError::CategoryMismatch { name: type_name::<T>() })?;
        Ok(cell_slice(self.chunk.buffer_cell(slot, row)))
    }
}

/// The chunks of a group that pass its filter, in iteration order.
pub struct ArchetypeChunkArray<'w> {
    chunks: Vec<ArchetypeChunk<'w>>,
}

impl<'w> ArchetypeChunkArray<'w> {
    pub(crate) fn new(
        ids: impl IntoIterator<Item = ChunkId>,
        pool: &'w ChunkPool,
        archetypes: &'w ArchetypeStore,
        registry: &'w ComponentRegistry,
    ) -> Self {
        let chunks = ids
            .into_iter()
            .map(|id| {
                let chunk = pool.chunk(id);
                ArchetypeChunk { id, chunk, layout: archetypes.get(chunk.archetype()).layout(), registry }
            })
            .collect();
        Self { chunks }
    }

    /// Number of chunks.
    pub fn len(&self) -> usize { self.chunks.len() }

    /// Returns `true` when no chunk passed.
    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    /// Chunk at `index`.
    pub fn get(&self, index: usize) -> Option<ArchetypeChunk<'w>> { self.chunks.get(index).copied() }

    /// Sum of the chunk counts.
    pub fn entity_count(&self) -> usize { self.chunks.iter().map(ArchetypeChunk::count).sum() }

    /// Chunks in iteration order.
    pub fn iter(&self) -> impl Iterator<Item = ArchetypeChunk<'w>> + '_ { self.chunks.iter().copied() }
}

/// Exclusive handle to one chunk, handed to parallel workers.
///
/// Only the columns the group declared read-write may be borrowed mutably.
pub struct ArchetypeChunkMut<'a> {
    id: ChunkId,
    chunk: &'a mut Chunk,
    layout: &'a ArchetypeLayout,
    registry: &'a ComponentRegistry,
    writes: &'a [TypeIndex],
    version: Version,
}

impl<'a> ArchetypeChunkMut<'a> {
    pub(crate) fn new(
        id: ChunkId,
        chunk: &'a mut Chunk,
        layout: &'a ArchetypeLayout,
        registry: &'a ComponentRegistry,
        writes: &'a [TypeIndex],
        version: Version,
    ) -> Self {
        Self { id, chunk, layout, registry, writes, version }
    }

    /// Chunk id.
    pub fn id(&self) -> ChunkId { self.id }

    /// Live rows.
    pub fn count(&self) -> usize { self.chunk.count() }

    /// Entity ids of the live rows.
    pub fn entities(&self) -> &[Entity] { self.chunk.entities(self.layout) }

    /// Column of `T`.
    pub fn column<T: Component>(&self) -> EcsResult<&[T]> {
        let (_, position) = column_position::<T>(self.registry, self.layout)?;
        Ok(self.chunk.column(self.layout, position))
    }

    fn writable<T: 'static>(&self) -> EcsResult<usize> {
        let (type_index, position) = column_position::<T>(self.registry, self.layout)?;
        if !self.writes.contains(&type_index) {
            return Err(AccessError::ReadOnly { type_index }.into());
        }
        Ok(position)
    }

    /// Mutable column of `T`; stamps the chunk.
    pub fn column_mut<T: Component>(&mut self) -> EcsResult<&mut [T]> {
        let position = self.writable::<T>()?;
        self.chunk.set_change_version(position, self.version);
        Ok(self.chunk.column_mut(self.layout, position))
    }

    /// Column of `R` for reading together with the column of `W` for writing.
    pub fn read_write<R: Component, W: Component>(&mut self) -> EcsResult<(&[R], &mut [W])> {
        let (read_index, read) = column_position::<R>(self.registry, self.layout)?;
        let write = self.writable::<W>()?;
        if read == write {
            return Err(AccessError::ReadAndWrite { type_index: read_index }.into());
        }
        self.chunk.set_change_version(write, self.version);
        Ok(self.chunk.read_write_columns(self.layout, read, write))
    }
}
