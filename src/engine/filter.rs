//! Chunk filters.
//!
//! A group may carry one filter that narrows which of its chunks an iteration
//! visits. There are two kinds and they are mutually exclusive:
//!
//! * **shared**: up to [`MAX_SHARED_FILTER`] shared components; a chunk
//!   passes when *every* listed shared slot holds the requested value index;
//! * **changed**: up to [`MAX_CHANGED_FILTER`] components; a chunk passes when
//!   *any* listed column was written strictly after the threshold version.
//!
//! Filters are evaluated per chunk, never per entity.

use crate::engine::archetype::ArchetypeLayout;
use crate::engine::chunk::Chunk;
use crate::engine::error::FilterError;
use crate::engine::group::MatchingArchetypes;
use crate::engine::types::{
    did_change, TypeIndex, Version, MAX_CHANGED_FILTER, MAX_SHARED_FILTER,
};


/// One shared-value condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedFilterEntry {
    /// Position of the shared type in the group's required list.
    pub index_in_group: usize,
    /// Registry index of the shared type.
    pub type_index: TypeIndex,
    /// Value index the chunk must hold.
    pub value_index: u32,
}

/// Shared-value equality over up to two components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedFilter {
    entries: Vec<SharedFilterEntry>,
}

impl SharedFilter {
    /// Entries in declaration order.
    pub fn entries(&self) -> &[SharedFilterEntry] { &self.entries }
}

/// Change-version threshold over up to two components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedFilter {
    indices_in_group: Vec<usize>,
    required_version: Version,
}

impl ChangedFilter {
    /// Positions of the watched types in the group's required list.
    pub fn indices_in_group(&self) -> &[usize] { &self.indices_in_group }

    /// Versions at or before this one do not count as a change.
    pub fn required_version(&self) -> Version { self.required_version }
}

/// Filter attached to a group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ChunkFilter {
    /// Every chunk passes.
    #[default]
    None,
    /// Shared-value equality.
    Shared(SharedFilter),
    /// Change-version threshold.
    Changed(ChangedFilter),
}

impl ChunkFilter {
    /// Builds a shared filter.
    pub fn shared(entries: &[SharedFilterEntry]) -> Result<Self, FilterError> {
        if entries.is_empty() || entries.len() > MAX_SHARED_FILTER {
            return Err(FilterError::TooManyComponents { requested: entries.len(), max: MAX_SHARED_FILTER });
        }
        Ok(ChunkFilter::Shared(SharedFilter { entries: entries.to_vec() }))
    }

    /// Builds a changed filter.
    pub fn changed(indices_in_group: &[usize], required_version: Version) -> Result<Self, FilterError> {
        if indices_in_group.is_empty() || indices_in_group.len() > MAX_CHANGED_FILTER {
            return Err(FilterError::TooManyComponents {
                requested: indices_in_group.len(),
                max: MAX_CHANGED_FILTER,
            });
        }
        Ok(ChunkFilter::Changed(ChangedFilter {
            indices_in_group: indices_in_group.to_vec(),
            required_version,
        }))
    }

    /// Returns `true` for [`ChunkFilter::None`].
    #[inline]
    pub fn is_none(&self) -> bool { matches!(self, ChunkFilter::None) }

    /// Returns `true` if replacing `self` with `next` would mix filter kinds.
    pub fn conflicts_with(&self, next: &ChunkFilter) -> bool {
        matches!(
            (self, next),
            (ChunkFilter::Shared(_), ChunkFilter::Changed(_)) | (ChunkFilter::Changed(_), ChunkFilter::Shared(_))
        )
    }

    /// Tests `chunk` of the archetype described by `matching`/`layout`.
    pub fn passes(&self, chunk: &Chunk, matching: &MatchingArchetypes, layout: &ArchetypeLayout) -> bool {
        match self {
            ChunkFilter::None => true,
            ChunkFilter::Shared(filter) => filter.entries.iter().all(|entry| {
                matching.index_in_archetype[entry.index_in_group]
                    .and_then(|position| layout.shared_slot[position])
                    .is_some_and(|slot| chunk.shared_value(slot) == entry.value_index)
            }),
            ChunkFilter::Changed(filter) => filter.indices_in_group.iter().any(|&index| {
                matching.index_in_archetype[index]
                    .is_some_and(|position| did_change(chunk.change_version(position), filter.required_version))
            }),
        }
    }
}
