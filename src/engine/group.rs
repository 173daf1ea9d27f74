//! # Group matcher
//!
//! A group is a query: a canonical list of required component types, some of
//! which may be marked as exclusions. The [`EntityGroupManager`] caches, per
//! distinct query, the list of archetypes it matches and keeps that list up
//! to date as archetypes appear.
//!
//! ## Deduplication
//!
//! Queries are canonicalised (sorted by type index, `Entity` prepended as a
//! read-only column) and hashed with `DefaultHasher`. Creating a group whose
//! canonical list is structurally equal to an existing one returns the cached
//! [`GroupId`] and does no matching work.
//!
//! ## Matching
//!
//! Both the query and every archetype are sorted by type index, so a single
//! merge-style scan decides whether an archetype contains every required type.
//! Exclusions must be absent. Archetypes carrying the built-in `Disabled` or
//! `Prefab` tag only match queries that explicitly require that tag.
//!
//! Each match is recorded as a [`MatchingArchetypes`] node holding the
//! position of every required type inside the archetype, so iteration never
//! has to search an archetype's type list. Nodes live in one arena and are
//! linked at the head of their group's list. Neither groups nor nodes are ever
//! removed.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::engine::archetype::{Archetype, ArchetypeLayout, ArchetypeStore};
use crate::engine::component::ComponentRegistry;
use crate::engine::error::{ComponentNotInGroupError, ConflictingQueryError, EcsResult, FilterError};
use crate::engine::filter::ChunkFilter;
use crate::engine::types::{
    canonicalize, AccessMode, ArchetypeId, ComponentType, GroupId, MatchId, TypeIndex,
    ENTITY_TYPE_INDEX,
};
use crate::engine::world::World;


/// Cached association between a group and one archetype it matches.
#[derive(Clone, Debug)]
pub struct MatchingArchetypes {
    /// Matched archetype.
    pub archetype: ArchetypeId,

    /// For each entry of the group's required list, its position in the
    /// archetype's type list (`None` for exclusions).
    pub index_in_archetype: Vec<Option<usize>>,

    /// Next node of the same group.
    pub next: Option<MatchId>,
}

/// Shared data of every group handle with the same canonical query.
#[derive(Clone, Debug)]
pub struct EntityGroupData {
    required: Vec<ComponentType>,
    hash: u64,
    first_match: Option<MatchId>,
    match_count: usize,
}

impl EntityGroupData {
    /// Canonical required list, `Entity` first.
    pub fn required(&self) -> &[ComponentType] { &self.required }

    /// Checksum of the required list.
    pub fn hash(&self) -> u64 { self.hash }

    /// Head of the matching-archetype list.
    pub fn first_match(&self) -> Option<MatchId> { self.first_match }

    /// Number of matched archetypes.
    pub fn match_count(&self) -> usize { self.match_count }
}

fn checksum(required: &[ComponentType]) -> u64 {
    let mut hasher = DefaultHasher::new();
    required.hash(&mut hasher);
    hasher.finish()
}

/// Returns the archetype positions of `required`, or `None` if `layout` does
/// not satisfy the query.
pub fn match_archetype(
    layout: &ArchetypeLayout,
    required: &[ComponentType],
    registry: &ComponentRegistry,
) -> Option<Vec<Option<usize>>> {
    let types = &layout.types;
    let mut positions = Vec::with_capacity(required.len());
    let mut cursor = 0;

    for component in required {
        if component.access_mode.is_exclusion() {
            if layout.contains(component.type_index) {
                return None;
            }
            positions.push(None);
            continue;
        }
        while cursor < types.len() && types[cursor] < component.type_index {
            cursor += 1;
        }
        if cursor == types.len() || types[cursor] != component.type_index {
            return None;
        }
        positions.push(Some(cursor));
        cursor += 1;
    }

    let explicitly = |tag: TypeIndex| {
        required.iter().any(|c| c.type_index == tag && !c.access_mode.is_exclusion())
    };
    if layout.disabled && !explicitly(registry.disabled_index()) {
        return None;
    }
    if layout.prefab && !explicitly(registry.prefab_index()) {
        return None;
    }
    Some(positions)
}

/// Registry of groups and their matching-archetype lists.
#[derive(Default)]
pub struct EntityGroupManager {
    groups: Vec<EntityGroupData>,
    matches: Vec<MatchingArchetypes>,
    buckets: HashMap<u64, Vec<GroupId>>,
}

impl EntityGroupManager {
    /// Creates an empty manager.
    pub fn new() -> Self { Self::default() }

    /// Number of distinct groups.
    pub fn group_count(&self) -> usize { self.groups.len() }

    /// Number of match nodes across all groups.
    pub fn match_node_count(&self) -> usize { self.matches.len() }

    /// Group data of `id`.
    #[inline]
    pub fn group(&self, id: GroupId) -> &EntityGroupData { &self.groups[id as usize] }

    /// Match node `id`.
    #[inline]
    pub fn match_node(&self, id: MatchId) -> &MatchingArchetypes { &self.matches[id as usize] }

    /// Match nodes of `group`, most recently linked first.
    pub fn matches_of(&self, group: GroupId) -> impl Iterator<Item = (MatchId, &MatchingArchetypes)> {
        let mut cursor = self.group(group).first_match;
        std::iter::from_fn(move || {
            let id = cursor?;
            let node = &self.matches[id as usize];
            cursor = node.next;
            Some((id, node))
        })
    }

    /// Builds the canonical required list of a query.
    ///
    /// A type listed both as present and as absent (including an excluded
    /// `Entity`, which every archetype carries) is rejected.
    pub fn canonical_query(
        required: &[ComponentType],
        excluded: &[ComponentType],
    ) -> Result<Vec<ComponentType>, ConflictingQueryError> {
        let mut canonical = Vec::with_capacity(required.len() + excluded.len() + 1);
        canonical.push(ComponentType::read_only(ENTITY_TYPE_INDEX));
        canonical.extend_from_slice(required);
        canonical.extend(excluded.iter().map(|c| c.with_access(AccessMode::Excluded)));
        canonical.sort();

        let conflict = canonical.windows(2).find(|w| {
            w[0].type_index == w[1].type_index && w[0].access_mode.is_exclusion() != w[1].access_mode.is_exclusion()
        });
        if let Some(pair) = conflict {
            return Err(ConflictingQueryError { type_index: pair[0].type_index });
        }

        canonicalize(&mut canonical);
        canonical[0] = ComponentType::read_only(ENTITY_TYPE_INDEX);
        Ok(canonical)
    }

    /// Returns the group for `required`/`excluded`, creating and matching it
    /// against every existing archetype on first use.
    pub fn create_group(
        &mut self,
        registry: &ComponentRegistry,
        archetypes: &ArchetypeStore,
        required: &[ComponentType],
        excluded: &[ComponentType],
    ) -> Result<GroupId, ConflictingQueryError> {
        let canonical = Self::canonical_query(required, excluded)?;
        let hash = checksum(&canonical);

        if let Some(ids) = self.buckets.get(&hash) {
            if let Some(&id) = ids.iter().find(|&&id| self.groups[id as usize].required == canonical) {
                return Ok(id);
            }
        }

        let id = self.groups.len() as GroupId;
        self.groups.push(EntityGroupData { required: canonical, hash, first_match: None, match_count: 0 });
        self.buckets.entry(hash).or_default().push(id);

        for archetype in archetypes.iter() {
            self.try_link(registry, id, archetype);
        }
        log::debug!(
            "created group {} types={:?} matching {} archetypes",
            id,
            self.groups[id as usize].required.iter().map(|c| c.type_index).collect::<Vec<_>>(),
            self.groups[id as usize].match_count
        );
        Ok(id)
    }

    /// Tests a newly created archetype against every live group.
    pub fn on_archetype_added(&mut self, registry: &ComponentRegistry, archetype: &Archetype) {
        for id in 0..self.groups.len() as GroupId {
            if self.try_link(registry, id, archetype) {
                log::trace!("archetype {} added to group {}", archetype.id(), id);
            }
        }
    }

    fn try_link(&mut self, registry: &ComponentRegistry, group: GroupId, archetype: &Archetype) -> bool {
        let data = &self.groups[group as usize];
        let Some(index_in_archetype) = match_archetype(archetype.layout(), &data.required, registry) else {
            return false;
        };

        let node = self.matches.len() as MatchId;
        self.matches.push(MatchingArchetypes {
            archetype: archetype.id(),
            index_in_archetype,
            next: data.first_match,
        });
        let data = &mut self.groups[group as usize];
        data.first_match = Some(node);
        data.match_count += 1;
        true
    }
}

/// Caller-owned handle to a group plus its filter.
///
/// Handles created for structurally equal queries share one [`GroupId`]; the
/// filter is per handle.
#[derive(Clone, Debug)]
pub struct ComponentGroup {
    id: GroupId,
    required: Vec<ComponentType>,
    filter: ChunkFilter,
}

impl ComponentGroup {
    pub(crate) fn new(id: GroupId, required: Vec<ComponentType>) -> Self {
        Self { id, required, filter: ChunkFilter::None }
    }

    /// Cached group id.
    #[inline]
    pub fn id(&self) -> GroupId { self.id }

    /// Canonical required list, `Entity` first.
    #[inline]
    pub fn required_types(&self) -> &[ComponentType] { &self.required }

    /// Active filter.
    #[inline]
    pub fn filter(&self) -> &ChunkFilter { &self.filter }

    /// Position of `type_index` in the required list, ignoring exclusions.
    pub fn index_in_group(&self, type_index: TypeIndex) -> Option<usize> {
        self.required
            .iter()
            .position(|c| c.type_index == type_index && !c.access_mode.is_exclusion())
    }

    /// Declared access mode of `type_index`, if required.
    pub fn access_mode(&self, type_index: TypeIndex) -> Option<AccessMode> {
        self.index_in_group(type_index).map(|i| self.required[i].access_mode)
    }

    pub(crate) fn require_index(&self, type_index: TypeIndex, name: &'static str) -> Result<usize, ComponentNotInGroupError> {
        self.index_in_group(type_index)
            .ok_or(ComponentNotInGroupError { type_index, name })
    }

    /// Replaces the filter. Switching between the shared and changed kinds
    /// without a [`reset_filter`](Self::reset_filter) in between fails.
    pub fn set_filter(&mut self, filter: ChunkFilter) -> Result<(), FilterError> {
        if self.filter.conflicts_with(&filter) {
            return Err(FilterError::MixedKinds);
        }
        self.filter = filter;
        Ok(())
    }

    /// Removes the filter.
    pub fn reset_filter(&mut self) { self.filter = ChunkFilter::None; }

    /// Types read by this group (read-only columns, `Entity` excluded).
    pub fn read_set(&self) -> Vec<TypeIndex> {
        self.required
            .iter()
            .skip(1)
            .filter(|c| c.access_mode == AccessMode::ReadOnly)
            .map(|c| c.type_index)
            .collect()
    }

    /// Types written by this group.
    pub fn write_set(&self) -> Vec<TypeIndex> {
        self.required
            .iter()
            .filter(|c| c.access_mode == AccessMode::ReadWrite)
            .map(|c| c.type_index)
            .collect()
    }
}

/// Fluent construction of a [`ComponentGroup`].
///
/// ```ignore
/// let group = world.query()
///     .read::<Velocity>()?
///     .write::<Position>()?
///     .without::<Frozen>()?
///     .build()?;
/// ```
pub struct GroupBuilder<'w> {
    world: &'w mut World,
    required: Vec<ComponentType>,
    excluded: Vec<ComponentType>,
}

impl<'w> GroupBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self { world, required: Vec::new(), excluded: Vec::new() }
    }

    /// Requires `T` for reading.
    pub fn read<T: 'static>(mut self) -> EcsResult<Self> {
        self.required.push(self.world.registry().read_only::<T>()?);
        Ok(self)
    }

    /// Requires `T` for writing.
    pub fn write<T: 'static>(mut self) -> EcsResult<Self> {
        self.required.push(self.world.registry().read_write::<T>()?);
        Ok(self)
    }

    /// Requires the tag `T` to be present.
    pub fn with_tag<T: 'static>(self) -> EcsResult<Self> {
        self.read::<T>()
    }

    /// Requires `T` to be absent.
    pub fn without<T: 'static>(mut self) -> EcsResult<Self> {
        let index = self.world.registry().require::<T>()?;
        self.excluded.push(ComponentType::excluded(index));
        Ok(self)
    }

    /// Creates (or fetches) the group.
    pub fn build(self) -> EcsResult<ComponentGroup> {
        self.world.create_group(&self.required, &self.excluded)
    }
}
