//! # World
//!
//! [`World`] is the context object every operation goes through. It owns
//!
//! * the component registry and the shared-value store,
//! * the entity location table,
//! * the chunk pool and the archetype registry,
//! * the group manager,
//! * the access tracker used by parallel chunk iteration,
//! * the global system version.
//!
//! There is no process-wide state: several worlds can live side by side, each
//! with its own registry and configuration.
//!
//! ## Versions
//!
//! The global system version starts at `1` and is advanced by
//! [`World::increment_global_system_version`], conventionally once per
//! update pass. Every write stamps the touched chunk column with the current
//! value; change filters and [`World::did_change`] compare against it.
//!
//! ## Structural changes
//!
//! Creating or destroying entities and adding or removing components take
//! `&mut self`, so they cannot overlap with a live view. Removal swaps the
//! last row of a chunk into the hole; entity order inside a chunk is not
//! stable across structural changes.

use std::any::type_name;

use rayon::prelude::*;

use crate::engine::archetype::{Archetype, ArchetypeStore};
use crate::engine::buffer::{BufferAlias, DynamicBuffer};
use crate::engine::chunk::ChunkPool;
use crate::engine::component::{BufferElement, Component, ComponentRegistry, SharedComponent};
use crate::engine::config::WorldConfig;
use crate::engine::entity::{Entity, EntityLocation, EntityStore};
use crate::engine::error::{
    AccessError, EcsResult, FilterError, IndexOutOfRangeError, MissingComponentError,
};
use crate::engine::filter::{ChunkFilter, SharedFilterEntry};
use crate::engine::group::{ComponentGroup, EntityGroupManager, GroupBuilder};
use crate::engine::iterator::ComponentChunkIterator;
use crate::engine::safety::{AccessGuard, AccessTracker, SafetyHandle};
use crate::engine::shared::SharedComponentStore;
use crate::engine::types::{
    did_change, AccessMode, ArchetypeId, ComponentCategory, ComponentType, RowId, TypeIndex,
    Version, ENTITY_TYPE_INDEX,
};
use crate::engine::views::{
    resolve_alias, ArchetypeChunkArray, ArchetypeChunkMut, BufferArray, ComponentDataArray,
    ComponentDataFromEntity, EntityArray, PoolRef, SharedComponentDataArray,
};


/// Entity storage context.
pub struct World {
    config: WorldConfig,
    registry: ComponentRegistry,
    entities: EntityStore,
    pool: ChunkPool,
    archetypes: ArchetypeStore,
    groups: EntityGroupManager,
    shared: SharedComponentStore,
    access: AccessTracker,
    safety: SafetyHandle,
    global_system_version: Version,
}

impl Default for World {
    fn default() -> Self { Self::new() }
}

impl World {
    /// Creates a world with the default configuration.
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Creates a world with `config`.
    pub fn with_config(config: WorldConfig) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        let registry = ComponentRegistry::new();
        let mut access = AccessTracker::new();
        access.ensure(registry.len());

        log::debug!(
            "created world chunk_bytes={} keep_empty_chunk={} safety_checks={}",
            config.chunk_bytes, config.keep_empty_chunk, config.safety_checks
        );

        Self {
            pool: ChunkPool::new(config.chunk_bytes, config.keep_empty_chunk),
            safety: SafetyHandle::new(config.safety_checks),
            config,
            registry,
            entities: EntityStore::new(),
            archetypes: ArchetypeStore::new(),
            groups: EntityGroupManager::new(),
            shared: SharedComponentStore::new(),
            access,
            global_system_version: 1,
        }
    }

    /// Configuration the world was created with.
    pub fn config(&self) -> &WorldConfig { &self.config }

    /// Component registry.
    pub fn registry(&self) -> &ComponentRegistry { &self.registry }

    // ── registration ────────────────────────────────────────────────────────

    /// Registers a plain-data component.
    pub fn register<T: Component>(&mut self) -> EcsResult<TypeIndex> {
        let type_index = self.registry.register::<T>()?;
        self.access.ensure(self.registry.len());
        Ok(type_index)
    }

    /// Registers a zero-sized tag.
    pub fn register_tag<T: Send + Sync + 'static>(&mut self) -> EcsResult<TypeIndex> {
        let type_index = self.registry.register_tag::<T>()?;
        self.access.ensure(self.registry.len());
        Ok(type_index)
    }

    /// Registers a buffer component with elements `T`.
    pub fn register_buffer<T: BufferElement>(&mut self) -> EcsResult<TypeIndex> {
        let type_index = self.registry.register_buffer::<T>()?;
        self.access.ensure(self.registry.len());
        Ok(type_index)
    }

    /// Registers a shared component.
    pub fn register_shared<S: SharedComponent>(&mut self) -> EcsResult<TypeIndex> {
        let type_index = self.registry.register_shared::<S>()?;
        self.shared.ensure::<S>(type_index);
        self.access.ensure(self.registry.len());
        Ok(type_index)
    }

    /// Rejects further registrations.
    pub fn freeze_components(&mut self) { self.registry.freeze(); }

    /// Type index of `T`.
    pub fn type_index<T: 'static>(&self) -> EcsResult<TypeIndex> {
        Ok(self.registry.require::<T>()?)
    }

    // ── versions ────────────────────────────────────────────────────────────

    /// Version stamped into columns by writes.
    #[inline]
    pub fn global_system_version(&self) -> Version { self.global_system_version }

    /// Advances the global system version and returns the new value.
    pub fn increment_global_system_version(&mut self) -> Version {
        self.global_system_version = self.global_system_version.wrapping_add(1).max(1);
        self.global_system_version
    }

    // ── archetypes ──────────────────────────────────────────────────────────

    /// Returns the archetype with exactly `types` (plus `Entity`), creating
    /// it on first use. Access modes are ignored; exclusions are skipped.
    pub fn archetype(&mut self, types: &[ComponentType]) -> EcsResult<ArchetypeId> {
        let indices: Vec<TypeIndex> = types
            .iter()
            .filter(|c| !c.access_mode.is_exclusion())
            .map(|c| c.type_index)
            .collect();
        self.archetype_from_indices(&indices)
    }

    fn archetype_from_indices(&mut self, types: &[TypeIndex]) -> EcsResult<ArchetypeId> {
        let (id, created) = self.archetypes.get_or_create(&self.registry, types, self.config.chunk_bytes)?;
        if created {
            self.groups.on_archetype_added(&self.registry, self.archetypes.get(id));
        }
        Ok(id)
    }

    /// Archetype `id`, if it exists.
    pub fn archetype_info(&self, id: ArchetypeId) -> Option<&Archetype> {
        ((id as usize) < self.archetypes.len()).then(|| self.archetypes.get(id))
    }

    // ── entities ────────────────────────────────────────────────────────────

    /// Creates one entity in `archetype` with zeroed data and default shared
    /// values.
    pub fn create_entity(&mut self, archetype: ArchetypeId) -> EcsResult<Entity> {
        let shared_values = self.default_shared_values(archetype)?;
        Ok(self.spawn_into(archetype, &shared_values))
    }

    /// Creates `count` entities in `archetype`.
    pub fn create_entities(&mut self, archetype: ArchetypeId, count: usize) -> EcsResult<Vec<Entity>> {
        let shared_values = self.default_shared_values(archetype)?;
        Ok((0..count).map(|_| self.spawn_into(archetype, &shared_values)).collect())
    }

    fn default_shared_values(&self, archetype: ArchetypeId) -> EcsResult<Vec<u32>> {
        let archetype = self.archetype_info(archetype).ok_or(IndexOutOfRangeError {
            index: archetype as usize,
            length: self.archetypes.len(),
        })?;
        Ok(vec![0; archetype.layout().shared_count])
    }

    fn spawn_into(&mut self, archetype: ArchetypeId, shared_values: &[u32]) -> Entity {
        let chunk = self.archetypes.find_or_allocate_chunk(&mut self.pool, archetype, shared_values);
        let row = self.pool.chunk(chunk).count() as RowId;
        let entity = self.entities.allocate(EntityLocation { archetype, chunk, row });

        let layout = self.archetypes.get(archetype).layout();
        let pushed = self.pool.chunk_mut(chunk).push_row(layout, entity, self.global_system_version);
        debug_assert_eq!(pushed, row);
        self.archetypes.on_row_added(&self.pool, archetype, chunk);
        entity
    }

    /// Destroys `entity`. The last entity of its chunk takes its row.
    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<()> {
        let location = self.entities.location(entity)?;
        let layout = self.archetypes.get(location.archetype).layout();
        let moved = self
            .pool
            .chunk_mut(location.chunk)
            .swap_remove_row(layout, location.row as usize, self.global_system_version);

        if let Some(moved) = moved {
            self.entities.set_location(moved, location);
        }
        self.entities.free(entity)?;
        self.archetypes.on_row_removed(&mut self.pool, location.archetype, location.chunk);
        Ok(())
    }

    /// Returns `true` if `entity` is alive.
    pub fn is_alive(&self, entity: Entity) -> bool { self.entities.is_alive(entity) }

    /// Current location of `entity`.
    pub fn entity_location(&self, entity: Entity) -> EcsResult<EntityLocation> {
        Ok(self.entities.location(entity)?)
    }

    /// Moves `entity` into the archetype with exactly `types`. Shared values
    /// carry over unless overridden.
    fn move_entity(
        &mut self,
        entity: Entity,
        types: &[TypeIndex],
        shared_overrides: &[(TypeIndex, u32)],
    ) -> EcsResult<EntityLocation> {
        let source = self.entities.location(entity)?;
        let destination = self.archetype_from_indices(types)?;

        let shared_values = {
            let src_layout = self.archetypes.get(source.archetype).layout();
            let dst_layout = self.archetypes.get(destination).layout();
            let src_chunk = self.pool.chunk(source.chunk);

            let mut values = vec![0; dst_layout.shared_count];
            for (position, slot) in dst_layout.shared_slot.iter().enumerate() {
                let Some(slot) = *slot else { continue };
                let type_index = dst_layout.types[position];
                if let Some(&(_, value)) = shared_overrides.iter().find(|(t, _)| *t == type_index) {
                    values[slot] = value;
                } else if let Some(src_slot) =
                    src_layout.position_of(type_index).and_then(|p| src_layout.shared_slot[p])
                {
                    values[slot] = src_chunk.shared_value(src_slot);
                }
            }
            values
        };

        let chunk = self.archetypes.find_or_allocate_chunk(&mut self.pool, destination, &shared_values);
        let src_layout = self.archetypes.get(source.archetype).layout();
        let dst_layout = self.archetypes.get(destination).layout();
        let (row, moved) = self.pool.move_row(
            source.chunk,
            src_layout,
            source.row as usize,
            chunk,
            dst_layout,
            self.global_system_version,
        );

        let target = EntityLocation { archetype: destination, chunk, row };
        self.entities.set_location(entity, target);
        if let Some(moved) = moved {
            self.entities.set_location(moved, source);
        }
        self.archetypes.on_row_added(&self.pool, destination, chunk);
        self.archetypes.on_row_removed(&mut self.pool, source.archetype, source.chunk);
        Ok(target)
    }

    fn add_type(&mut self, entity: Entity, type_index: TypeIndex) -> EcsResult<()> {
        let location = self.entities.location(entity)?;
        let archetype = self.archetypes.get(location.archetype);
        if archetype.layout().contains(type_index) {
            return Ok(());
        }
        let mut types = archetype.types().to_vec();
        types.push(type_index);
        self.move_entity(entity, &types, &[])?;
        Ok(())
    }

    /// Adds `T` to `entity` (moving it to another archetype) and stores
    /// `value`. If `T` is already present the value is overwritten.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let type_index = self.writable_data_index::<T>()?;
        self.add_type(entity, type_index)?;
        self.set_component(entity, value)
    }

    /// Adds the tag `T` to `entity`.
    pub fn add_tag<T: 'static>(&mut self, entity: Entity) -> EcsResult<()> {
        let type_index = self.registry.require_category::<T>(ComponentCategory::Tag)?;
        self.add_type(entity, type_index)
    }

    /// Adds an empty `T` buffer to `entity`.
    pub fn add_buffer<T: BufferElement>(&mut self, entity: Entity) -> EcsResult<()> {
        let type_index = self.registry.require_category::<T>(ComponentCategory::Buffer)?;
        self.add_type(entity, type_index)
    }

    /// Removes `T` (of any category) from `entity`.
    pub fn remove_component<T: 'static>(&mut self, entity: Entity) -> EcsResult<()> {
        let type_index = self.registry.require::<T>()?;
        if type_index == ENTITY_TYPE_INDEX {
            return Err(AccessError::ReadOnly { type_index }.into());
        }
        let location = self.entities.location(entity)?;
        let archetype = self.archetypes.get(location.archetype);
        if !archetype.layout().contains(type_index) {
            return Err(MissingComponentError { entity, type_index }.into());
        }
        let types: Vec<TypeIndex> = archetype.types().iter().copied().filter(|&t| t != type_index).collect();
        self.move_entity(entity, &types, &[])?;
        Ok(())
    }

    /// Returns `true` if `entity` is alive and carries `T`.
    pub fn has_component<T: 'static>(&self, entity: Entity) -> bool {
        match (self.registry.index_of::<T>(), self.entities.location(entity)) {
            (Some(type_index), Ok(location)) => self.archetypes.get(location.archetype).layout().contains(type_index),
            _ => false,
        }
    }

    /// Data type index of `T`; the implicit `Entity` column is never writable.
    fn writable_data_index<T: 'static>(&self) -> EcsResult<TypeIndex> {
        let type_index = self.registry.require_category::<T>(ComponentCategory::Data)?;
        if type_index == ENTITY_TYPE_INDEX {
            return Err(AccessError::ReadOnly { type_index }.into());
        }
        Ok(type_index)
    }

    fn data_position<T: 'static>(&self, entity: Entity, category: ComponentCategory) -> EcsResult<(EntityLocation, usize)> {
        let type_index = self.registry.require_category::<T>(category)?;
        self.position_in_row(entity, type_index)
    }

    fn position_in_row(&self, entity: Entity, type_index: TypeIndex) -> EcsResult<(EntityLocation, usize)> {
        let location = self.entities.location(entity)?;
        let position = self
            .archetypes
            .get(location.archetype)
            .layout()
            .position_of(type_index)
            .ok_or(MissingComponentError { entity, type_index })?;
        Ok((location, position))
    }

    /// Stores `value` as the `T` of `entity`; stamps the chunk column.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let type_index = self.writable_data_index::<T>()?;
        let (location, position) = self.position_in_row(entity, type_index)?;
        let layout = self.archetypes.get(location.archetype).layout();
        let chunk = self.pool.chunk_mut(location.chunk);
        *chunk.element_mut::<T>(layout, position, location.row as usize) = value;
        chunk.set_change_version(position, self.global_system_version);
        Ok(())
    }

    /// Value of `T` on `entity`.
    pub fn get_component<T: Component>(&self, entity: Entity) -> EcsResult<T> {
        let (location, position) = self.data_position::<T>(entity, ComponentCategory::Data)?;
        let layout = self.archetypes.get(location.archetype).layout();
        Ok(*self.pool.chunk(location.chunk).element::<T>(layout, position, location.row as usize))
    }

    /// Sets the shared `S` of `entity`, moving it to a chunk holding that
    /// value. Adds `S` to the entity if it is missing.
    pub fn set_shared_component<S: SharedComponent>(&mut self, entity: Entity, value: S) -> EcsResult<()> {
        let type_index = self.registry.require_category::<S>(ComponentCategory::Shared)?;
        let value_index = self.shared.insert_or_find(type_index, value)?;
        let location = self.entities.location(entity)?;
        let archetype = self.archetypes.get(location.archetype);
        let layout = archetype.layout();

        let mut types = archetype.types().to_vec();
        match layout.position_of(type_index).and_then(|p| layout.shared_slot[p]) {
            Some(slot) => {
                if self.pool.chunk(location.chunk).shared_value(slot) == value_index {
                    return Ok(());
                }
            }
            None => types.push(type_index),
        }
        self.move_entity(entity, &types, &[(type_index, value_index)])?;
        Ok(())
    }

    /// Shared `S` of `entity`.
    pub fn get_shared_component<S: SharedComponent>(&self, entity: Entity) -> EcsResult<&S> {
        let (location, position) = self.data_position::<S>(entity, ComponentCategory::Shared)?;
        let layout = self.archetypes.get(location.archetype).layout();
        let slot = layout.shared_slot[position].ok_or(MissingComponentError { entity, type_index: layout.types[position] })?;
        let value_index = self.pool.chunk(location.chunk).shared_value(slot);
        Ok(self.shared.get::<S>(layout.types[position], value_index)?)
    }

    /// Mutable `T` buffer of `entity`; stamps the chunk column.
    pub fn buffer<T: BufferElement>(&mut self, entity: Entity) -> EcsResult<DynamicBuffer<'_, T>> {
        let (location, position) = self.data_position::<T>(entity, ComponentCategory::Buffer)?;
        let layout = self.archetypes.get(location.archetype).layout();
        let slot = layout.buffer_slot[position].ok_or(MissingComponentError { entity, type_index: layout.types[position] })?;

        let chunk = self.pool.chunk_mut(location.chunk);
        chunk.set_change_version(position, self.global_system_version);
        let cell = chunk.buffer_cell_mut(slot, location.row as usize);
        Ok(DynamicBuffer::new(cell, Some((location.chunk, slot, location.row, entity))))
    }

    /// Reads a buffer through a previously captured alias.
    pub fn resolve_buffer_alias<T: BufferElement>(&self, alias: &BufferAlias) -> EcsResult<&[T]> {
        resolve_alias(&self.pool, &self.archetypes, self.safety, alias)
    }

    // ── groups and filters ──────────────────────────────────────────────────

    /// Returns a handle to the group for `required`/`excluded`.
    ///
    /// Fails when a type is listed both as present and as absent.
    pub fn create_group(&mut self, required: &[ComponentType], excluded: &[ComponentType]) -> EcsResult<ComponentGroup> {
        let id = self.groups.create_group(&self.registry, &self.archetypes, required, excluded)?;
        Ok(ComponentGroup::new(id, self.groups.group(id).required().to_vec()))
    }

    /// Starts a typed group definition.
    pub fn query(&mut self) -> GroupBuilder<'_> { GroupBuilder::new(self) }

    /// Number of distinct groups.
    pub fn group_count(&self) -> usize { self.groups.group_count() }

    /// Number of archetypes matched by `group`.
    pub fn matching_archetype_count(&self, group: &ComponentGroup) -> usize {
        self.groups.group(group.id()).match_count()
    }

    /// Archetypes matched by `group`, most recently matched first.
    pub fn matching_archetypes(&self, group: &ComponentGroup) -> Vec<ArchetypeId> {
        self.groups.matches_of(group.id()).map(|(_, node)| node.archetype).collect()
    }

    fn shared_filter_entry<S: SharedComponent>(&mut self, group: &ComponentGroup, value: S) -> EcsResult<SharedFilterEntry> {
        let type_index = self.registry.require::<S>()?;
        if self.registry.desc(type_index)?.category != ComponentCategory::Shared {
            return Err(FilterError::WrongCategory { type_index }.into());
        }
        let index_in_group = group.require_index(type_index, type_name::<S>()).map_err(FilterError::from)?;
        let value_index = self.shared.insert_or_find(type_index, value)?;
        Ok(SharedFilterEntry { index_in_group, type_index, value_index })
    }

    /// Restricts `group` to chunks whose `S` equals `value`.
    pub fn set_shared_filter<S: SharedComponent>(&mut self, group: &mut ComponentGroup, value: S) -> EcsResult<()> {
        let entry = self.shared_filter_entry(group, value)?;
        group.set_filter(ChunkFilter::shared(&[entry])?)?;
        Ok(())
    }

    /// Restricts `group` to chunks whose `S1` equals `a` and `S2` equals `b`.
    pub fn set_shared_filter2<S1: SharedComponent, S2: SharedComponent>(
        &mut self,
        group: &mut ComponentGroup,
        a: S1,
        b: S2,
    ) -> EcsResult<()> {
        let first = self.shared_filter_entry(group, a)?;
        let second = self.shared_filter_entry(group, b)?;
        group.set_filter(ChunkFilter::shared(&[first, second])?)?;
        Ok(())
    }

    /// Restricts `group` to chunks where any of `types` was written after
    /// `since`.
    pub fn set_changed_filter(&self, group: &mut ComponentGroup, types: &[ComponentType], since: Version) -> EcsResult<()> {
        let indices = types
            .iter()
            .map(|c| {
                let name = self.registry.desc(c.type_index).map(|d| d.name).unwrap_or("<unregistered>");
                group.require_index(c.type_index, name).map_err(FilterError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        group.set_filter(ChunkFilter::changed(&indices, since)?)?;
        Ok(())
    }

    // ── views ───────────────────────────────────────────────────────────────

    fn column_index<T: 'static>(&self, group: &ComponentGroup, category: ComponentCategory) -> EcsResult<(TypeIndex, usize)> {
        let type_index = self.registry.require_category::<T>(category)?;
        let index_in_group = group.require_index(type_index, type_name::<T>())?;
        Ok((type_index, index_in_group))
    }

    fn iterator(&self, group: &ComponentGroup) -> ComponentChunkIterator<'_> {
        ComponentChunkIterator::new(&self.archetypes, &self.groups, group, self.global_system_version)
    }

    /// Number of entities visible through `group` and its filter.
    pub fn calculate_length(&self, group: &ComponentGroup) -> usize {
        self.iterator(group).calculate_length(&self.pool)
    }

    /// Read-only view of the `T` column of `group`.
    pub fn component_data_array<T: Component>(&self, group: &ComponentGroup) -> EcsResult<ComponentDataArray<'_, T>> {
        let (type_index, index_in_group) = self.column_index::<T>(group, ComponentCategory::Data)?;
        Ok(ComponentDataArray::new(
            self.iterator(group),
            &self.archetypes,
            PoolRef::Shared(&self.pool),
            index_in_group,
            type_index,
            true,
        ))
    }

    /// Writable view of the `T` column of `group`. Writes fail if the group
    /// declares `T` read-only.
    pub fn component_data_array_mut<T: Component>(&mut self, group: &ComponentGroup) -> EcsResult<ComponentDataArray<'_, T>> {
        let (type_index, index_in_group) = self.column_index::<T>(group, ComponentCategory::Data)?;
        let read_only = group.required_types()[index_in_group].access_mode == AccessMode::ReadOnly;
        let iterator = ComponentChunkIterator::new(&self.archetypes, &self.groups, group, self.global_system_version);
        Ok(ComponentDataArray::new(
            iterator,
            &self.archetypes,
            PoolRef::Exclusive(&mut self.pool),
            index_in_group,
            type_index,
            read_only,
        ))
    }

    /// Entity ids of `group`.
    pub fn entity_array(&self, group: &ComponentGroup) -> EntityArray<'_> {
        EntityArray::new(self.iterator(group), &self.archetypes, &self.pool)
    }

    /// Shared `S` values of `group`.
    pub fn shared_component_data_array<S: SharedComponent>(
        &self,
        group: &ComponentGroup,
    ) -> EcsResult<SharedComponentDataArray<'_, S>> {
        let (type_index, index_in_group) = self.column_index::<S>(group, ComponentCategory::Shared)?;
        Ok(SharedComponentDataArray::new(
            self.iterator(group),
            &self.archetypes,
            &self.pool,
            &self.shared,
            index_in_group,
            type_index,
        ))
    }

    /// Buffers of `T` in `group`. The group must declare `T` read-write.
    pub fn buffer_array<T: BufferElement>(&mut self, group: &ComponentGroup) -> EcsResult<BufferArray<'_, T>> {
        let (type_index, index_in_group) = self.column_index::<T>(group, ComponentCategory::Buffer)?;
        if group.required_types()[index_in_group].access_mode == AccessMode::ReadOnly {
            return Err(AccessError::ReadOnly { type_index }.into());
        }
        let iterator = ComponentChunkIterator::new(&self.archetypes, &self.groups, group, self.global_system_version);
        Ok(BufferArray::new(iterator, &self.archetypes, &mut self.pool, self.safety, index_in_group))
    }

    /// Read-only random access to `T` by entity.
    pub fn component_data_from_entity<T: Component>(&self) -> EcsResult<ComponentDataFromEntity<'_, T>> {
        let type_index = self.registry.require_category::<T>(ComponentCategory::Data)?;
        Ok(ComponentDataFromEntity::new(
            &self.entities,
            &self.archetypes,
            PoolRef::Shared(&self.pool),
            type_index,
            self.global_system_version,
        ))
    }

    /// Writable random access to `T` by entity.
    pub fn component_data_from_entity_mut<T: Component>(&mut self) -> EcsResult<ComponentDataFromEntity<'_, T>> {
        let type_index = self.writable_data_index::<T>()?;
        Ok(ComponentDataFromEntity::new(
            &self.entities,
            &self.archetypes,
            PoolRef::Exclusive(&mut self.pool),
            type_index,
            self.global_system_version,
        ))
    }

    /// Chunks of `group` that pass its filter.
    pub fn archetype_chunk_array(&self, group: &ComponentGroup) -> ArchetypeChunkArray<'_> {
        let ids = self
            .iterator(group)
            .matching_chunks(&self.pool)
            .into_iter()
            .map(|(_, chunk)| chunk);
        ArchetypeChunkArray::new(ids, &self.pool, &self.archetypes, &self.registry)
    }

    /// Returns `true` if the `T` column of any chunk matched by `group` was
    /// written after `since`. The group's filter is ignored.
    pub fn did_change<T: 'static>(&self, group: &ComponentGroup, since: Version) -> EcsResult<bool> {
        let type_index = self.registry.require::<T>()?;
        let index_in_group = group.require_index(type_index, type_name::<T>())?;

        for (_, node) in self.groups.matches_of(group.id()) {
            let Some(position) = node.index_in_archetype[index_in_group] else { continue };
            let mut cursor = self.archetypes.get(node.archetype).first_chunk();
            while let Some(id) = cursor {
                let chunk = self.pool.chunk(id);
                if did_change(chunk.change_version(position), since) {
                    return Ok(true);
                }
                cursor = chunk.next;
            }
        }
        Ok(false)
    }

    /// Runs `f` on every chunk of `group` that passes its filter, in
    /// parallel on the rayon pool.
    ///
    /// The group's read and write sets are borrowed on the access tracker for
    /// the duration of the call. Only read-write columns can be borrowed
    /// mutably inside `f`. The first error returned by `f` is propagated.
    pub fn par_for_each_chunk<F>(&mut self, group: &ComponentGroup, f: F) -> EcsResult<()>
    where
        F: Fn(ArchetypeChunkMut<'_>) -> EcsResult<()> + Send + Sync,
    {
        let reads = group.read_set();
        let writes = group.write_set();
        let _guard = AccessGuard::try_new(&self.access, &reads, &writes)?;

        let mut selected: Vec<Option<ArchetypeId>> = vec![None; self.pool.slot_count()];
        for (_, chunk) in self.iterator(group).matching_chunks(&self.pool) {
            selected[chunk as usize] = Some(self.pool.chunk(chunk).archetype());
        }

        let archetypes = &self.archetypes;
        let registry = &self.registry;
        let version = self.global_system_version;
        let writes = writes.as_slice();

        self.pool.par_chunks_mut().try_for_each(|(id, chunk)| {
            match selected.get(id as usize).copied().flatten() {
                Some(archetype) => f(ArchetypeChunkMut::new(
                    id,
                    chunk,
                    archetypes.get(archetype).layout(),
                    registry,
                    writes,
                    version,
                )),
                None => Ok(()),
            }
        })
    }

    // ── safety ──────────────────────────────────────────────────────────────

    /// Column borrow tracker shared by task schedulers.
    pub fn access_tracker(&self) -> &AccessTracker { &self.access }

    /// Borrows `reads` and `writes` on the access tracker until the guard is
    /// dropped. Fails without waiting if any column is held in a
    /// conflicting mode.
    pub fn try_acquire(&self, reads: &[TypeIndex], writes: &[TypeIndex]) -> EcsResult<AccessGuard<'_>> {
        Ok(AccessGuard::try_new(&self.access, reads, writes)?)
    }

    // ── introspection ───────────────────────────────────────────────────────

    /// Number of archetypes.
    pub fn archetype_count(&self) -> usize { self.archetypes.len() }

    /// Number of live chunks.
    pub fn chunk_count(&self) -> usize { self.pool.live_count() }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize { self.entities.live_count() }

    /// Freed chunk buffers retained for reuse.
    pub fn pooled_chunk_buffers(&self) -> usize { self.pool.pooled_buffers() }
}
