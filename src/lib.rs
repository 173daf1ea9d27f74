//! # chunk_ecs
//!
//! Archetype/chunk entity storage with cached group matching, streaming
//! iteration and per-chunk change tracking.
//!
//! ## Design Goals
//! - Fixed-size columnar chunks per archetype for cache efficiency
//! - Groups resolved once and kept current as archetypes appear
//! - Flat-index views that stream across chunk boundaries
//! - Per-chunk, per-column change versions for cheap change filtering
//! - Safe, explicit data access (no raw pointers into chunk memory)
//!
//! ## Example
//! ```rust
//! use chunk_ecs::prelude::*;
//!
//! #[derive(Clone, Copy, Default, Pod, Zeroable)]
//! #[repr(C)]
//! struct Position { x: f32, y: f32 }
//!
//! let mut world = World::new();
//! let position = world.register::<Position>().unwrap();
//! let archetype = world.archetype(&[ComponentType::read_write(position)]).unwrap();
//! world.create_entities(archetype, 10).unwrap();
//!
//! let group = world.query().write::<Position>().unwrap().build().unwrap();
//! assert_eq!(world.calculate_length(&group), 10);
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::world::World;

pub use engine::config::WorldConfig;

pub use engine::entity::{
    Entity,
    EntityLocation,
};

pub use engine::component::{
    Component,
    BufferElement,
    SharedComponent,
    ComponentDesc,
    ComponentRegistry,
    Disabled,
    Prefab,
};

pub use engine::archetype::{
    Archetype,
    ArchetypeLayout,
};

pub use engine::group::{
    ComponentGroup,
    GroupBuilder,
};

pub use engine::filter::ChunkFilter;

pub use engine::iterator::{
    ChunkCache,
    ComponentChunkIterator,
};

pub use engine::buffer::{
    BufferAlias,
    DynamicBuffer,
};

pub use engine::views::{
    ArchetypeChunk,
    ArchetypeChunkArray,
    ArchetypeChunkMut,
    BufferArray,
    ComponentDataArray,
    ComponentDataFromEntity,
    EntityArray,
    SharedComponentDataArray,
};

pub use engine::safety::{
    AccessGuard,
    AccessTracker,
};

pub use engine::error::{
    EcsResult,
    EcsError,
    AccessError,
    ChunkCapacityError,
    ComponentNotInGroupError,
    ConflictingQueryError,
    ConfigError,
    FilterError,
    IndexOutOfRangeError,
    MissingComponentError,
    RegistryError,
    StaleEntityError,
    StaleViewError,
};

pub use engine::types::{
    did_change,
    AccessMode,
    ArchetypeId,
    ChunkId,
    ComponentCategory,
    ComponentType,
    GroupId,
    TypeIndex,
    Version,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use chunk_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use bytemuck::{Pod, Zeroable};

    pub use crate::{
        World,
        WorldConfig,
        Entity,
        ComponentGroup,
        ComponentType,
        AccessMode,
        EcsResult,
        EcsError,
        Version,
        Disabled,
        Prefab,
    };
}
