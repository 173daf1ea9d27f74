//! Core identifiers, constants, and query type handles.
//!
//! This module defines the **small copyable types** shared by every layer of
//! the storage engine: arena indices for archetypes, chunks, groups and
//! matching records, change versions, and the [`ComponentType`] handle used to
//! describe queries.
//!
//! ## Identifiers
//!
//! Every long-lived object in a world lives in a growable arena and is
//! referred to by a plain integer index:
//!
//! - [`TypeIndex`]: a registered component type,
//! - [`ArchetypeId`]: an archetype (exact component-type set),
//! - [`ChunkId`]: a slot in the chunk pool,
//! - [`GroupId`]: cached group data shared by structurally equal queries,
//! - [`MatchId`]: a cached group/archetype match record.
//!
//! Arenas only ever grow (archetypes, groups and matches are never destroyed),
//! so indices stay valid for the lifetime of the world.
//!
//! ## Change versions
//!
//! A [`Version`] is a wrapping `u32` counter. Version `0` means "never
//! written". Comparisons go through [`did_change`], which treats the counter
//! as circular so a long-running world survives wrap-around.

use std::cmp::Ordering;

/// Index of a registered component type within a world's registry.
pub type TypeIndex = u32;

/// Index of an archetype within a world's archetype store.
pub type ArchetypeId = u32;

/// Index of a chunk slot within a world's chunk pool.
pub type ChunkId = u32;

/// Index of cached group data within the group manager.
pub type GroupId = u32;

/// Index of a matching-archetype record within the group manager.
pub type MatchId = u32;

/// Row index inside a chunk.
pub type RowId = u32;

/// Change / system version counter.
pub type Version = u32;

/// Default byte budget of a single chunk.
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// Largest component alignment the chunk layout supports.
pub const MAX_COMPONENT_ALIGN: usize = 16;

/// Maximum number of shared components a single shared filter may compare.
pub const MAX_SHARED_FILTER: usize = 2;

/// Maximum number of components a single changed filter may watch.
pub const MAX_CHANGED_FILTER: usize = 2;

/// Bytes of element storage a buffer cell holds before spilling to the heap.
pub const BUFFER_INLINE_BYTES: usize = 64;

/// Type index reserved for the implicit `Entity` column.
pub const ENTITY_TYPE_INDEX: TypeIndex = 0;

/// Returns `true` if `changed` is strictly newer than `since`.
///
/// Versions wrap, so the comparison is done on the signed distance. A column
/// that was never written (`0`) never counts as changed.

#[inline]
pub fn did_change(changed: Version, since: Version) -> bool {
    changed != 0 && (changed.wrapping_sub(since) as i32) > 0
}

/// How a query intends to touch a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessMode {
    /// Read and write access; writes bump the column change version.
    ReadWrite,
    /// Read-only access.
    ReadOnly,
    /// The archetype must not contain this type (legacy form used inside a
    /// required list).
    Subtractive,
    /// The archetype must not contain this type (form produced from an
    /// explicit excluded list).
    Excluded,
}

impl AccessMode {
    /// Returns `true` for the two "must be absent" modes.
    #[inline]
    pub fn is_exclusion(self) -> bool {
        matches!(self, AccessMode::Subtractive | AccessMode::Excluded)
    }
}

/// Storage category of a registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComponentCategory {
    /// Plain data stored in a per-entity column.
    Data,
    /// Dynamic buffer: a per-entity small-vector cell.
    Buffer,
    /// Value shared by every entity of a chunk; stored once per chunk.
    Shared,
    /// Zero-sized marker; no storage at all.
    Tag,
}

/// A component type as referenced by a query or archetype request.
///
/// Ordering is by `type_index` first, so sorting a list of handles yields the
/// canonical archetype order (with the entity column first).

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentType {
    /// Registry index of the type.
    pub type_index: TypeIndex,
    /// Declared access mode.
    pub access_mode: AccessMode,
}

impl ComponentType {
    /// Read-write handle for `type_index`.
    #[inline]
    pub const fn read_write(type_index: TypeIndex) -> Self {
        Self { type_index, access_mode: AccessMode::ReadWrite }
    }

    /// Read-only handle for `type_index`.
    #[inline]
    pub const fn read_only(type_index: TypeIndex) -> Self {
        Self { type_index, access_mode: AccessMode::ReadOnly }
    }

    /// Subtractive handle for `type_index`.
    #[inline]
    pub const fn subtractive(type_index: TypeIndex) -> Self {
        Self { type_index, access_mode: AccessMode::Subtractive }
    }

    /// Excluded handle for `type_index`.
    #[inline]
    pub const fn excluded(type_index: TypeIndex) -> Self {
        Self { type_index, access_mode: AccessMode::Excluded }
    }

    /// Returns a copy with a different access mode.
    #[inline]
    pub const fn with_access(self, access_mode: AccessMode) -> Self {
        Self { type_index: self.type_index, access_mode }
    }
}

impl PartialOrd for ComponentType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_index
            .cmp(&other.type_index)
            .then(self.access_mode.cmp(&other.access_mode))
    }
}

/// Sorts `types` into canonical order and removes duplicate type indices.
///
/// When the same type appears twice the first handle after sorting wins, which
/// keeps `ReadWrite` over `ReadOnly` for the same index.

pub fn canonicalize(types: &mut Vec<ComponentType>) {
    types.sort();
    types.dedup_by_key(|t| t.type_index);
}
