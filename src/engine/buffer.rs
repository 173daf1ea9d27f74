//! Dynamic buffer cells.
//!
//! A buffer-typed component does not store its elements in the chunk row.
//! Each entity instead owns a [`BufferCell`]: a small-vector that keeps up to
//! [`BUFFER_INLINE_BYTES`] of elements inline and spills to a heap block when
//! it grows past that. The chunk itself never reallocates because of buffer
//! growth.
//!
//! ## Invalidation
//!
//! Every time a cell's storage moves (spill to heap, heap regrowth, or the row
//! being moved to another chunk) its safety version is bumped. A
//! [`BufferAlias`] captured before the move carries the old version, so
//! resolving it later is reported as a [`StaleViewError`] instead of reading
//! whatever now lives at that location.

use std::marker::PhantomData;
use std::mem::size_of;

use crate::engine::chunk::{AlignedBlock, BLOCK_BYTES};
use crate::engine::component::BufferElement;
use crate::engine::entity::Entity;
use crate::engine::error::StaleViewError;
use crate::engine::types::{ChunkId, RowId, Version, BUFFER_INLINE_BYTES};


const INLINE_BLOCKS: usize = BUFFER_INLINE_BYTES / BLOCK_BYTES;

enum BufferStorage {
    Inline([AlignedBlock; INLINE_BLOCKS]),
    Heap(Vec<AlignedBlock>),
}

impl BufferStorage {
    #[inline]
    fn blocks(&self) -> &[AlignedBlock] {
        match self {
            BufferStorage::Inline(blocks) => blocks,
            BufferStorage::Heap(blocks) => blocks,
        }
    }

    #[inline]
    fn blocks_mut(&mut self) -> &mut [AlignedBlock] {
        match self {
            BufferStorage::Inline(blocks) => blocks,
            BufferStorage::Heap(blocks) => blocks,
        }
    }
}

/// Per-entity storage of one buffer component.
pub struct BufferCell {
    len: usize,
    storage: BufferStorage,
    safety_version: Version,
}

impl Default for BufferCell {
    fn default() -> Self {
        Self {
            len: 0,
            storage: BufferStorage::Inline([AlignedBlock::ZERO; INLINE_BLOCKS]),
            safety_version: 1,
        }
    }
}

impl BufferCell {
    /// Number of elements stored.
    #[inline]
    pub fn len(&self) -> usize { self.len }

    /// Returns `true` when the cell holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Returns `true` while the elements still live inline.
    #[inline]
    pub fn is_inline(&self) -> bool { matches!(self.storage, BufferStorage::Inline(_)) }

    /// Current safety version.
    #[inline]
    pub fn safety_version(&self) -> Version { self.safety_version }

    /// Number of `element_size` elements that fit without reallocating.
    #[inline]
    pub fn capacity(&self, element_size: usize) -> usize {
        self.storage.blocks().len() * BLOCK_BYTES / element_size
    }

    /// Marks the storage as moved, invalidating outstanding aliases.
    #[inline]
    pub(crate) fn invalidate(&mut self) {
        self.safety_version = self.safety_version.wrapping_add(1).max(1);
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.storage.blocks())
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.storage.blocks_mut())
    }

    fn as_slice<T: BufferElement>(&self) -> &[T] {
        let used = self.len * size_of::<T>();
        bytemuck::cast_slice(&self.bytes()[..used])
    }

    fn as_mut_slice<T: BufferElement>(&mut self) -> &mut [T] {
        let used = self.len * size_of::<T>();
        bytemuck::cast_slice_mut(&mut self.bytes_mut()[..used])
    }

    /// Grows the storage so that at least `min_elements` of `element_size`
    /// fit. Always moves to (or within) the heap and bumps the safety version.
    fn grow(&mut self, element_size: usize, min_elements: usize) {
        let current = self.storage.blocks().len();
        let needed = (min_elements * element_size).div_ceil(BLOCK_BYTES);
        let blocks = needed.max(current * 2).max(INLINE_BLOCKS);

        let mut heap = vec![AlignedBlock::ZERO; blocks];
        let used = self.len * element_size;
        bytemuck::cast_slice_mut::<AlignedBlock, u8>(&mut heap)[..used]
            .copy_from_slice(&self.bytes()[..used]);

        log::trace!(
            "buffer cell spilled: {} -> {} bytes ({} elements)",
            current * BLOCK_BYTES, blocks * BLOCK_BYTES, self.len
        );
        self.storage = BufferStorage::Heap(heap);
        self.invalidate();
    }
}

/// Typed, mutable view of one entity's buffer.
pub struct DynamicBuffer<'a, T: BufferElement> {
    cell: &'a mut BufferCell,
    alias_base: Option<(ChunkId, usize, RowId, Entity)>,
    _marker: PhantomData<T>,
}

impl<'a, T: BufferElement> DynamicBuffer<'a, T> {
    pub(crate) fn new(cell: &'a mut BufferCell, alias_base: Option<(ChunkId, usize, RowId, Entity)>) -> Self {
        Self { cell, alias_base, _marker: PhantomData }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize { self.cell.len }

    /// Returns `true` when empty.
    #[inline]
    pub fn is_empty(&self) -> bool { self.cell.len == 0 }

    /// Elements that fit before the next reallocation.
    #[inline]
    pub fn capacity(&self) -> usize { self.cell.capacity(size_of::<T>()) }

    /// Returns `true` while storage is still inline.
    #[inline]
    pub fn is_inline(&self) -> bool { self.cell.is_inline() }

    /// Elements as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] { self.cell.as_slice() }

    /// Elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] { self.cell.as_mut_slice() }

    /// Appends an element, spilling to the heap when the inline space is full.
    pub fn push(&mut self, value: T) {
        let size = size_of::<T>();
        if self.cell.len == self.capacity() {
            self.cell.grow(size, self.cell.len + 1);
        }
        let at = self.cell.len * size;
        self.cell.bytes_mut()[at..at + size].copy_from_slice(bytemuck::bytes_of(&value));
        self.cell.len += 1;
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        let last = *self.as_slice().last()?;
        self.cell.len -= 1;
        Some(last)
    }

    /// Removes every element. Storage is kept.
    pub fn clear(&mut self) { self.cell.len = 0; }

    /// Ensures room for `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        let wanted = self.cell.len + additional;
        if wanted > self.capacity() {
            self.cell.grow(size_of::<T>(), wanted);
        }
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<&T> { self.as_slice().get(index) }

    /// Captures a detached alias of this buffer for later, checked reads.
    ///
    /// Returns `None` for buffers obtained through an entity lookup that has
    /// no stable chunk position.
    pub fn alias(&self) -> Option<BufferAlias> {
        let (chunk, slot, row, entity) = self.alias_base?;
        Some(BufferAlias { chunk, slot, row, entity, safety_version: self.cell.safety_version })
    }
}

/// Detached handle to a buffer, validated on every use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferAlias {
    pub(crate) chunk: ChunkId,
    pub(crate) slot: usize,
    pub(crate) row: RowId,
    pub(crate) entity: Entity,
    pub(crate) safety_version: Version,
}

impl BufferAlias {
    /// Entity whose buffer this alias refers to.
    pub fn entity(&self) -> Entity { self.entity }

    /// Safety version captured at creation.
    pub fn safety_version(&self) -> Version { self.safety_version }

    pub(crate) fn check(&self, cell: &BufferCell) -> Result<(), StaleViewError> {
        if cell.safety_version != self.safety_version {
            return Err(StaleViewError { expected: self.safety_version, found: cell.safety_version });
        }
        Ok(())
    }
}

pub(crate) fn cell_slice<T: BufferElement>(cell: &BufferCell) -> &[T] {
    cell.as_slice()
}
