//! Fixed-size chunks and the chunk allocator.
//!
//! A [`Chunk`] holds up to `capacity` entities of a single archetype in a
//! column-oriented byte arena:
//!
//! ```text
//! | Entity × cap | A × cap | B × cap | ... |        (one column per data type)
//!   offset 0       offsets[1]  offsets[2]
//! ```
//!
//! Column offsets and strides come from the owning archetype's
//! [`ArchetypeLayout`]; every typed access is a bounds-checked byte range that
//! `bytemuck` reinterprets as a slice of the component type. No raw pointer
//! into a chunk ever escapes this module.
//!
//! Besides the arena a chunk carries:
//!
//! * a dense live count (`0 <= count <= capacity`, rows `[0, count)` live),
//! * one change version per archetype type, bumped on every write,
//! * one shared-value index per shared type in the archetype,
//! * one vector of [`BufferCell`]s per buffer type,
//! * the `prev`/`next` links of the archetype's doubly-linked chunk list.
//!
//! ## Removal
//!
//! Removing a row swaps the last live row into the hole. Entity order inside a
//! chunk is therefore **not** stable across removals.

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

use crate::engine::archetype::ArchetypeLayout;
use crate::engine::buffer::BufferCell;
use crate::engine::entity::Entity;
use crate::engine::types::{ArchetypeId, ChunkId, ComponentCategory, RowId, Version};


/// Size in bytes of one arena block.
pub const BLOCK_BYTES: usize = 16;

/// Freed chunk buffers retained for reuse when pooling is enabled.
const MAX_RETAINED_BUFFERS: usize = 16;

/// 16-byte aligned unit of chunk and buffer storage.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub struct AlignedBlock(pub [u8; BLOCK_BYTES]);

impl AlignedBlock {
    /// All-zero block.
    pub const ZERO: Self = Self([0; BLOCK_BYTES]);
}

// SAFETY: a single byte array with alignment equal to its size has no padding
// and every bit pattern is valid.
unsafe impl Zeroable for AlignedBlock {}
unsafe impl Pod for AlignedBlock {}

/// A fixed-capacity block of entities sharing one archetype.
pub struct Chunk {
    archetype: ArchetypeId,
    count: usize,
    capacity: usize,
    data: Vec<AlignedBlock>,
    change_versions: Vec<Version>,
    shared_values: Vec<u32>,
    buffers: Vec<Vec<BufferCell>>,
    pub(crate) prev: Option<ChunkId>,
    pub(crate) next: Option<ChunkId>,
}

impl Chunk {
    /// Archetype whose layout this chunk uses.
    #[inline] pub fn archetype(&self) -> ArchetypeId { self.archetype }

    /// Number of live rows.
    #[inline] pub fn count(&self) -> usize { self.count }

    /// Maximum number of rows.
    #[inline] pub fn capacity(&self) -> usize { self.capacity }

    /// Returns `true` when no further row fits.
    #[inline] pub fn is_full(&self) -> bool { self.count == self.capacity }

    /// Shared-value indices, one per shared type of the archetype.
    #[inline] pub fn shared_values(&self) -> &[u32] { &self.shared_values }

    /// Shared-value index stored in `slot`.
    #[inline] pub fn shared_value(&self, slot: usize) -> u32 { self.shared_values[slot] }

    /// Change version of the column at archetype position `position`.
    #[inline] pub fn change_version(&self, position: usize) -> Version { self.change_versions[position] }

    /// All change versions in archetype type order.
    #[inline] pub fn change_versions(&self) -> &[Version] { &self.change_versions }

    /// Stamps the column at `position` as written at `version`.
    #[inline]
    pub fn set_change_version(&mut self, position: usize, version: Version) {
        self.change_versions[position] = version;
    }

    /// Stamps every column as written at `version`.
    pub fn set_all_change_versions(&mut self, version: Version) {
        self.change_versions.iter_mut().for_each(|v| *v = version);
    }

    #[inline]
    fn bytes(&self) -> &[u8] { bytemuck::cast_slice(&self.data) }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] { bytemuck::cast_slice_mut(&mut self.data) }

    #[inline]
    fn element_range(layout: &ArchetypeLayout, position: usize, row: usize) -> std::ops::Range<usize> {
        let stride = layout.strides[position];
        let start = layout.offsets[position] + row * stride;
        start..start + stride
    }

    /// Live bytes of the data column at `position`.
    pub fn column_bytes(&self, layout: &ArchetypeLayout, position: usize) -> &[u8] {
        let start = layout.offsets[position];
        &self.bytes()[start..start + self.count * layout.strides[position]]
    }

    /// Live rows of the data column at `position` as `T`.
    ///
    /// ## Panics
    /// Panics if `T` does not have the column's stride.
    pub fn column<T: Pod>(&self, layout: &ArchetypeLayout, position: usize) -> &[T] {
        bytemuck::cast_slice(self.column_bytes(layout, position))
    }

    /// Mutable live rows of the data column at `position` as `T`.
    ///
    /// Does not stamp the change version; callers that write do that.
    pub fn column_mut<T: Pod>(&mut self, layout: &ArchetypeLayout, position: usize) -> &mut [T] {
        let start = layout.offsets[position];
        let end = start + self.count * layout.strides[position];
        bytemuck::cast_slice_mut(&mut self.bytes_mut()[start..end])
    }

    /// Entity ids of the live rows.
    #[inline]
    pub fn entities(&self, layout: &ArchetypeLayout) -> &[Entity] {
        self.column(layout, 0)
    }

    /// Entity stored at `row`.
    #[inline]
    pub fn entity_at(&self, layout: &ArchetypeLayout, row: usize) -> Entity {
        *self.element(layout, 0, row)
    }

    /// Element of the data column at `position`, row `row`.
    #[inline]
    pub fn element<T: Pod>(&self, layout: &ArchetypeLayout, position: usize, row: usize) -> &T {
        debug_assert!(row < self.count);
        bytemuck::from_bytes(&self.bytes()[Self::element_range(layout, position, row)])
    }

    /// Mutable element of the data column at `position`, row `row`.
    #[inline]
    pub fn element_mut<T: Pod>(&mut self, layout: &ArchetypeLayout, position: usize, row: usize) -> &mut T {
        debug_assert!(row < self.count);
        let range = Self::element_range(layout, position, row);
        bytemuck::from_bytes_mut(&mut self.bytes_mut()[range])
    }

    /// Buffer cell of buffer slot `slot`, row `row`.
    #[inline]
    pub fn buffer_cell(&self, slot: usize, row: usize) -> &BufferCell { &self.buffers[slot][row] }

    /// Mutable buffer cell of buffer slot `slot`, row `row`.
    #[inline]
    pub fn buffer_cell_mut(&mut self, slot: usize, row: usize) -> &mut BufferCell { &mut self.buffers[slot][row] }

    /// Splits the chunk into disjoint typed columns for one read column and
    /// one written column.
    pub(crate) fn read_write_columns<R: Pod, W: Pod>(
        &mut self,
        layout: &ArchetypeLayout,
        read: usize,
        write: usize,
    ) -> (&[R], &mut [W]) {
        debug_assert_ne!(read, write);
        let count = self.count;
        let read_range = layout.offsets[read]..layout.offsets[read] + count * layout.strides[read];
        let write_range = layout.offsets[write]..layout.offsets[write] + count * layout.strides[write];
        let bytes = self.bytes_mut();

        if read_range.start < write_range.start {
            let (low, high) = bytes.split_at_mut(write_range.start);
            let r = &low[read_range];
            let w = &mut high[..write_range.len()];
            (bytemuck::cast_slice(r), bytemuck::cast_slice_mut(w))
        } else {
            let (low, high) = bytes.split_at_mut(read_range.start);
            let w = &mut low[write_range];
            let r = &high[..read_range.len()];
            (bytemuck::cast_slice(r), bytemuck::cast_slice_mut(w))
        }
    }

    /// Appends a zero-initialised row for `entity` and stamps every column
    /// with `version`.
    pub fn push_row(&mut self, layout: &ArchetypeLayout, entity: Entity, version: Version) -> RowId {
        debug_assert!(self.count < self.capacity, "push_row on a full chunk");
        let row = self.count;
        self.count += 1;

        for position in 1..layout.types.len() {
            if layout.descs[position].category == ComponentCategory::Data {
                let range = Self::element_range(layout, position, row);
                self.bytes_mut()[range].fill(0);
            }
        }
        *self.element_mut::<Entity>(layout, 0, row) = entity;

        for cells in &mut self.buffers {
            cells.push(BufferCell::default());
        }

        self.set_all_change_versions(version);
        row as RowId
    }

    /// Removes `row` by moving the last live row into it.
    ///
    /// Returns the entity that now occupies `row`, or `None` if `row` was the
    /// last row. Columns are stamped with `version` only when a row moved.
    pub fn swap_remove_row(&mut self, layout: &ArchetypeLayout, row: usize, version: Version) -> Option<Entity> {
        debug_assert!(row < self.count);
        let last = self.count - 1;
        let mut moved = None;

        if row != last {
            for position in 0..layout.types.len() {
                if layout.descs[position].category != ComponentCategory::Data {
                    continue;
                }
                let from = Self::element_range(layout, position, last);
                let to = Self::element_range(layout, position, row).start;
                self.bytes_mut().copy_within(from, to);
            }
            moved = Some(self.entity_at(layout, row));
            self.set_all_change_versions(version);
        }

        for cells in &mut self.buffers {
            cells.swap_remove(row);
            if row != last {
                cells[row].invalidate();
            }
        }
        self.count = last;
        moved
    }

    /// Takes the buffer cell out of `slot`/`row`, leaving an empty one.
    pub(crate) fn take_buffer(&mut self, slot: usize, row: usize) -> BufferCell {
        std::mem::take(&mut self.buffers[slot][row])
    }
}

/// Arena of chunks with slot reuse and buffer pooling.
///
/// Chunk ids are stable for the lifetime of a chunk; a freed slot may be
/// handed out again to a later chunk.
pub struct ChunkPool {
    chunk_bytes: usize,
    keep_empty: bool,
    slots: Vec<Option<Chunk>>,
    free_slots: Vec<ChunkId>,
    retained: Vec<Vec<AlignedBlock>>,
}

impl ChunkPool {
    /// Creates an empty pool producing chunks of `chunk_bytes` bytes.
    pub fn new(chunk_bytes: usize, keep_empty: bool) -> Self {
        Self { chunk_bytes, keep_empty, slots: Vec::new(), free_slots: Vec::new(), retained: Vec::new() }
    }

    /// Byte budget of each chunk.
    #[inline] pub fn chunk_bytes(&self) -> usize { self.chunk_bytes }

    /// Number of live chunks.
    pub fn live_count(&self) -> usize { self.slots.len() - self.free_slots.len() }

    /// Number of slots, live or free. Every chunk id is below this.
    pub fn slot_count(&self) -> usize { self.slots.len() }

    /// Number of freed buffers waiting for reuse.
    pub fn pooled_buffers(&self) -> usize { self.retained.len() }

    /// Allocates an empty chunk for `archetype`.
    pub fn allocate(
        &mut self,
        archetype: ArchetypeId,
        layout: &ArchetypeLayout,
        shared_values: &[u32],
    ) -> ChunkId {
        let data = match self.retained.pop() {
            Some(data) => {
                log::trace!("reusing pooled chunk buffer for archetype {}", archetype);
                data
            }
            None => vec![AlignedBlock::ZERO; self.chunk_bytes / BLOCK_BYTES],
        };

        let chunk = Chunk {
            archetype,
            count: 0,
            capacity: layout.capacity,
            data,
            change_versions: vec![0; layout.types.len()],
            shared_values: shared_values.to_vec(),
            buffers: (0..layout.buffer_count).map(|_| Vec::new()).collect(),
            prev: None,
            next: None,
        };

        let id = match self.free_slots.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(chunk);
                id
            }
            None => {
                self.slots.push(Some(chunk));
                (self.slots.len() - 1) as ChunkId
            }
        };
        log::trace!("allocated chunk {} for archetype {} (capacity {})", id, archetype, layout.capacity);
        id
    }

    /// Frees chunk `id`, pooling its buffer when configured to.
    pub fn free(&mut self, id: ChunkId) {
        if let Some(chunk) = self.slots.get_mut(id as usize).and_then(Option::take) {
            debug_assert_eq!(chunk.count, 0, "freeing a non-empty chunk");
            if self.keep_empty && self.retained.len() < MAX_RETAINED_BUFFERS {
                self.retained.push(chunk.data);
            }
            self.free_slots.push(id);
            log::trace!("freed chunk {} of archetype {}", id, chunk.archetype);
        }
    }

    /// Live chunk `id`, if any.
    #[inline]
    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Mutable live chunk `id`, if any.
    #[inline]
    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Live chunk `id`.
    ///
    /// ## Panics
    /// Panics if `id` is not live; ids handed out by archetype chunk lists
    /// always are.
    #[inline]
    pub fn chunk(&self, id: ChunkId) -> &Chunk {
        match self.get(id) {
            Some(chunk) => chunk,
            None => panic!("chunk {id} is not live"),
        }
    }

    /// Mutable live chunk `id`.
    ///
    /// ## Panics
    /// Panics if `id` is not live.
    #[inline]
    pub fn chunk_mut(&mut self, id: ChunkId) -> &mut Chunk {
        match self.get_mut(id) {
            Some(chunk) => chunk,
            None => panic!("chunk {id} is not live"),
        }
    }

    fn pair_mut(&mut self, a: ChunkId, b: ChunkId) -> (&mut Chunk, &mut Chunk) {
        assert_ne!(a, b, "pair_mut requires two distinct chunks");
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (left, right) = self.slots.split_at_mut(high as usize);
        let (low_chunk, high_chunk) = match (left[low as usize].as_mut(), right[0].as_mut()) {
            (Some(l), Some(h)) => (l, h),
            _ => panic!("chunks {a} and {b} must both be live"),
        };
        if a < b { (low_chunk, high_chunk) } else { (high_chunk, low_chunk) }
    }

    /// Moves row `row` of `source` into a new row of `destination`.
    ///
    /// Data and buffer components present in both layouts are carried over;
    /// components only present in the destination start zeroed/empty. The
    /// source row is swap-removed.
    ///
    /// Returns the destination row and the entity that was swapped into the
    /// vacated source row, if any.
    pub fn move_row(
        &mut self,
        source: ChunkId,
        source_layout: &ArchetypeLayout,
        row: usize,
        destination: ChunkId,
        destination_layout: &ArchetypeLayout,
        version: Version,
    ) -> (RowId, Option<Entity>) {
        let (src, dst) = self.pair_mut(source, destination);
        let entity = src.entity_at(source_layout, row);
        let dst_row = dst.push_row(destination_layout, entity, version) as usize;

        for (dst_position, desc) in destination_layout.descs.iter().enumerate().skip(1) {
            let Some(src_position) = source_layout.position_of(desc.type_index) else { continue };
            match desc.category {
                ComponentCategory::Data => {
                    let from = Chunk::element_range(source_layout, src_position, row);
                    let to = Chunk::element_range(destination_layout, dst_position, dst_row);
                    dst.bytes_mut()[to].copy_from_slice(&src.bytes()[from]);
                }
                ComponentCategory::Buffer => {
                    let (Some(src_slot), Some(dst_slot)) =
                        (source_layout.buffer_slot[src_position], destination_layout.buffer_slot[dst_position])
                    else { continue };
                    let mut cell = src.take_buffer(src_slot, row);
                    cell.invalidate();
                    dst.buffers[dst_slot][dst_row] = cell;
                }
                ComponentCategory::Shared | ComponentCategory::Tag => {}
            }
        }

        let moved = src.swap_remove_row(source_layout, row, version);
        (dst_row as RowId, moved)
    }

    /// Parallel iterator over every live chunk with its id.
    pub fn par_chunks_mut(&mut self) -> impl ParallelIterator<Item = (ChunkId, &mut Chunk)> {
        self.slots
            .par_iter_mut()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_mut().map(|chunk| (id as ChunkId, chunk)))
    }
}
