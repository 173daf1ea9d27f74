//! # Chunk iterator
//!
//! [`ComponentChunkIterator`] presents the chunks of a group as one flat index
//! space, as if every matching entity lived in a single array. It keeps a
//! cursor (current match node, current chunk, and the flat index at which
//! each starts) so that translating an index costs only the distance moved
//! since the last call:
//!
//! ```text
//! match A: [chunk 0: 0..128) [chunk 1: 128..256) [chunk 2: 256..300)
//! match B: [chunk 7: 300..340)
//! ```
//!
//! Sequential access, by far the dominant pattern, is therefore amortised
//! O(1). Asking for an index behind the cursor restarts from the first match.
//!
//! With a filter, chunks that fail the predicate contribute no indices at
//! all; both [`calculate_length`](ComponentChunkIterator::calculate_length)
//! and [`move_to_entity_index`](ComponentChunkIterator::move_to_entity_index)
//! must then visit chunks one by one instead of skipping whole archetypes by
//! their entity counts. Callers that only need the length of a filtered group
//! should expect a cost proportional to its chunk count.
//!
//! ## Cache
//!
//! After positioning, [`update_cache_to_current_chunk`] returns a
//! [`ChunkCache`]: the half-open flat range `[begin_index, end_index)` covered
//! by the current chunk plus the column position of the requested type. Views
//! keep that cache and only go back to the iterator on a miss. The writing
//! form stamps the column with the global system version.
//!
//! [`update_cache_to_current_chunk`]: ComponentChunkIterator::update_cache_to_current_chunk

use crate::engine::archetype::ArchetypeStore;
use crate::engine::chunk::ChunkPool;
use crate::engine::error::{EcsResult, IndexOutOfRangeError};
use crate::engine::filter::ChunkFilter;
use crate::engine::group::{ComponentGroup, EntityGroupManager, MatchingArchetypes};
use crate::engine::types::{ArchetypeId, ChunkId, MatchId, Version};


/// Resolved location of the chunk that contains a flat index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkCache {
    /// First flat index stored in `chunk`.
    pub begin_index: usize,
    /// One past the last flat index stored in `chunk`.
    pub end_index: usize,
    /// Chunk holding the range.
    pub chunk: ChunkId,
    /// Archetype of `chunk`.
    pub archetype: ArchetypeId,
    /// Position of the requested type in the archetype's type list.
    pub position: usize,
    /// The column version was stamped when this cache was produced.
    pub written: bool,
}

impl ChunkCache {
    /// Returns `true` if `index` lies in the cached range.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index >= self.begin_index && index < self.end_index
    }

    /// Row of `index` inside the cached chunk.
    #[inline]
    pub fn row(&self, index: usize) -> usize {
        index - self.begin_index
    }
}

/// Cursor over the chunks of one group.
#[derive(Clone)]
pub struct ComponentChunkIterator<'w> {
    archetypes: &'w ArchetypeStore,
    groups: &'w EntityGroupManager,
    first_match: Option<MatchId>,
    filter: ChunkFilter,
    global_system_version: Version,

    current_match: Option<MatchId>,
    current_chunk: Option<ChunkId>,
    current_archetype_entity_index: usize,
    current_chunk_entity_index: usize,
}

impl<'w> ComponentChunkIterator<'w> {
    /// Creates a cursor over `group`, positioned before its first chunk.
    pub fn new(
        archetypes: &'w ArchetypeStore,
        groups: &'w EntityGroupManager,
        group: &ComponentGroup,
        global_system_version: Version,
    ) -> Self {
        Self {
            archetypes,
            groups,
            first_match: groups.group(group.id()).first_match(),
            filter: group.filter().clone(),
            global_system_version,
            current_match: None,
            current_chunk: None,
            current_archetype_entity_index: 0,
            current_chunk_entity_index: 0,
        }
    }

    /// Version stamped into columns on write.
    #[inline]
    pub fn global_system_version(&self) -> Version { self.global_system_version }

    /// Filter applied by this cursor.
    #[inline]
    pub fn filter(&self) -> &ChunkFilter { &self.filter }

    #[inline]
    fn node(&self, id: MatchId) -> &'w MatchingArchetypes { self.groups.match_node(id) }

    fn first_chunk_of(&self, id: MatchId) -> Option<ChunkId> {
        self.archetypes.get(self.node(id).archetype).first_chunk()
    }

    /// Match node and chunk following `(match_id, chunk)` in group order.
    fn next_position(&self, pool: &ChunkPool, match_id: MatchId, chunk: ChunkId) -> Option<(MatchId, ChunkId)> {
        if let Some(next) = pool.chunk(chunk).next {
            return Some((match_id, next));
        }
        self.first_position_from(self.node(match_id).next)
    }

    /// First `(match, chunk)` at or after match node `from`.
    fn first_position_from(&self, mut from: Option<MatchId>) -> Option<(MatchId, ChunkId)> {
        while let Some(id) = from {
            if let Some(chunk) = self.first_chunk_of(id) {
                return Some((id, chunk));
            }
            from = self.node(id).next;
        }
        None
    }

    /// Every `(match, chunk)` of the group that passes the filter.
    pub fn matching_chunks(&self, pool: &ChunkPool) -> Vec<(MatchId, ChunkId)> {
        let mut out = Vec::new();
        let mut position = self.first_position_from(self.first_match);
        while let Some((match_id, chunk)) = position {
            if self.chunk_passes(pool, match_id, chunk) {
                out.push((match_id, chunk));
            }
            position = self.next_position(pool, match_id, chunk);
        }
        out
    }

    #[inline]
    fn chunk_passes(&self, pool: &ChunkPool, match_id: MatchId, chunk: ChunkId) -> bool {
        if self.filter.is_none() {
            return true;
        }
        let node = self.node(match_id);
        let layout = self.archetypes.get(node.archetype).layout();
        self.filter.passes(pool.chunk(chunk), node, layout)
    }

    /// Number of entities visible through this cursor.
    ///
    /// Unfiltered this sums archetype entity counts. Filtered it tests every
    /// chunk of every matched archetype.
    pub fn calculate_length(&self, pool: &ChunkPool) -> usize {
        if self.filter.is_none() {
            let mut length = 0;
            let mut cursor = self.first_match;
            while let Some(id) = cursor {
                let node = self.node(id);
                length += self.archetypes.get(node.archetype).entity_count();
                cursor = node.next;
            }
            return length;
        }

        self.matching_chunks(pool)
            .into_iter()
            .map(|(_, chunk)| pool.chunk(chunk).count())
            .sum()
    }

    fn reset(&mut self) {
        self.current_archetype_entity_index = 0;
        self.current_chunk_entity_index = 0;
        match self.first_position_from(self.first_match) {
            Some((m, c)) => {
                self.current_match = Some(m);
                self.current_chunk = Some(c);
            }
            None => {
                self.current_match = None;
                self.current_chunk = None;
            }
        }
    }

    /// Positions the cursor on the chunk holding flat index `index`.
    pub fn move_to_entity_index(&mut self, pool: &ChunkPool, index: usize) -> Result<(), IndexOutOfRangeError> {
        if self.filter.is_none() {
            self.move_unfiltered(pool, index)
        } else {
            self.move_filtered(pool, index)
        }
    }

    fn out_of_range(&self, pool: &ChunkPool, index: usize) -> IndexOutOfRangeError {
        IndexOutOfRangeError { index, length: self.calculate_length(pool) }
    }

    fn move_unfiltered(&mut self, pool: &ChunkPool, index: usize) -> Result<(), IndexOutOfRangeError> {
        if self.current_match.is_none() || index < self.current_archetype_entity_index {
            self.reset();
        }

        // Whole archetypes first.
        loop {
            let Some(match_id) = self.current_match else {
                return Err(self.out_of_range(pool, index));
            };
            let node = self.node(match_id);
            let archetype = self.archetypes.get(node.archetype);
            let end = self.current_archetype_entity_index + archetype.entity_count();
            if index < end {
                break;
            }
            self.current_archetype_entity_index = end;
            self.current_chunk_entity_index = end;
            match self.first_position_from(node.next) {
                Some((m, c)) => {
                    self.current_match = Some(m);
                    self.current_chunk = Some(c);
                }
                None => {
                    self.current_match = None;
                    self.current_chunk = None;
                }
            }
        }

        // Then chunks inside the archetype.
        if index < self.current_chunk_entity_index {
            self.current_chunk_entity_index = self.current_archetype_entity_index;
            self.current_chunk = self.current_match.and_then(|m| self.first_chunk_of(m));
        }
        loop {
            let Some(chunk) = self.current_chunk else {
                return Err(self.out_of_range(pool, index));
            };
            let chunk = pool.chunk(chunk);
            let end = self.current_chunk_entity_index + chunk.count();
            if index < end {
                return Ok(());
            }
            self.current_chunk_entity_index = end;
            self.current_chunk = chunk.next;
        }
    }

    fn move_filtered(&mut self, pool: &ChunkPool, index: usize) -> Result<(), IndexOutOfRangeError> {
        if self.current_chunk.is_none() || index < self.current_chunk_entity_index {
            self.reset();
        }

        loop {
            let (Some(match_id), Some(chunk)) = (self.current_match, self.current_chunk) else {
                return Err(self.out_of_range(pool, index));
            };
            if self.chunk_passes(pool, match_id, chunk) {
                let end = self.current_chunk_entity_index + pool.chunk(chunk).count();
                if index < end {
                    return Ok(());
                }
                self.current_chunk_entity_index = end;
            }

            match self.next_position(pool, match_id, chunk) {
                Some((m, c)) => {
                    if m != match_id {
                        self.current_archetype_entity_index = self.current_chunk_entity_index;
                    }
                    self.current_match = Some(m);
                    self.current_chunk = Some(c);
                }
                None => {
                    self.current_match = None;
                    self.current_chunk = None;
                }
            }
        }
    }

    fn current_cache(&self, pool: &ChunkPool, index_in_group: usize, written: bool) -> EcsResult<ChunkCache> {
        let (Some(match_id), Some(chunk)) = (self.current_match, self.current_chunk) else {
            return Err(IndexOutOfRangeError { index: self.current_chunk_entity_index, length: 0 }.into());
        };
        let node = self.node(match_id);
        let position = node.index_in_archetype[index_in_group]
            .ok_or(IndexOutOfRangeError { index: index_in_group, length: node.index_in_archetype.len() })?;
        let begin_index = self.current_chunk_entity_index;
        Ok(ChunkCache {
            begin_index,
            end_index: begin_index + pool.chunk(chunk).count(),
            chunk,
            archetype: node.archetype,
            position,
            written,
        })
    }

    /// Cache for reading column `index_in_group` of the current chunk.
    pub fn update_cache_to_current_chunk(&self, pool: &ChunkPool, index_in_group: usize) -> EcsResult<ChunkCache> {
        self.current_cache(pool, index_in_group, false)
    }

    /// Cache for writing column `index_in_group` of the current chunk; stamps
    /// the column with the global system version.
    pub fn update_cache_to_current_chunk_for_write(
        &self,
        pool: &mut ChunkPool,
        index_in_group: usize,
    ) -> EcsResult<ChunkCache> {
        let cache = self.current_cache(pool, index_in_group, true)?;
        pool.chunk_mut(cache.chunk).set_change_version(cache.position, self.global_system_version);
        Ok(cache)
    }
}
