//! Error types for archetype storage, group queries and typed views.
//!
//! Every failure in this crate is deterministic and caller-caused, so there is
//! no retry policy anywhere: errors surface immediately through `Result` and
//! are never logged-and-continued. The types fall into three families:
//!
//! * **Contract violations**: out-of-range indices, requesting a component a
//!   group does not declare, mixing filter kinds, writing through a read-only
//!   view ([`IndexOutOfRangeError`], [`ComponentNotInGroupError`],
//!   [`FilterError`], [`AccessError`]).
//! * **Capacity / configuration errors**: a component or row that cannot fit
//!   into a single chunk ([`ChunkCapacityError`], [`ConfigError`],
//!   [`RegistryError`]). These are raised when the archetype or world is
//!   created, never later.
//! * **Stale-view errors**: using a buffer alias after its storage was grown
//!   or moved ([`StaleViewError`]), or an entity handle after it was destroyed
//!   ([`StaleEntityError`]).
//!
//! Each low-level error is a small struct or enum with a `Display` message
//! suitable for logs; [`EcsError`] aggregates them with `From` conversions so
//! higher layers can use `?` freely.
//!
//! ## Example
//! ```ignore
//! match positions.get(index) {
//!     Ok(p) => { /* … */ }
//!     Err(EcsError::IndexOutOfRange(e)) => {
//!         eprintln!("index {} past length {}", e.index, e.length);
//!     }
//!     Err(other) => return Err(other),
//! }
//! ```

use std::fmt;

use crate::engine::entity::Entity;
use crate::engine::types::{TypeIndex, Version};


/// Convenience alias used by every fallible operation in the crate.
pub type EcsResult<T> = Result<T, EcsError>;

/// Returned when a flat view index is not below the view's length.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutOfRangeError {
    /// Requested flat index.
    pub index: usize,

    /// Length of the view at construction time.
    pub length: usize,
}

impl fmt::Display for IndexOutOfRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index {} out of range (length {})", self.index, self.length)
    }
}

impl std::error::Error for IndexOutOfRangeError {}

/// Returned when a view or filter names a component type the group does not
/// declare (or declares only as an exclusion).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentNotInGroupError {
    /// Registry index of the offending type.
    pub type_index: TypeIndex,

    /// Rust type name for diagnostics.
    pub name: &'static str,
}

impl fmt::Display for ComponentNotInGroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component {} (type index {}) is not part of the group", self.name, self.type_index)
    }
}

impl std::error::Error for ComponentNotInGroupError {}

/// Returned when a query both requires a type and asks for it to be absent.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictingQueryError {
    /// Registry index of the type listed with both modes.
    pub type_index: TypeIndex,
}

impl fmt::Display for ConflictingQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type index {} is both required and excluded by the query", self.type_index)
    }
}

impl std::error::Error for ConflictingQueryError {}

/// Errors raised while configuring a group filter.
///
/// Shared-value filters and change-version filters are mutually exclusive;
/// attempting to combine them is a programming error.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    /// A shared filter was requested while a changed filter is active, or the
    /// other way round.
    MixedKinds,

    /// More components were passed than the filter kind supports.
    TooManyComponents {
        /// Number of components requested.
        requested: usize,
        /// Supported maximum.
        max: usize,
    },

    /// The filtered component is not declared by the group.
    NotInGroup(ComponentNotInGroupError),

    /// A shared filter was requested on a type that is not a shared component.
    WrongCategory {
        /// Registry index of the offending type.
        type_index: TypeIndex,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::MixedKinds => f.write_str("shared-value and change-version filters cannot be combined"),
            FilterError::TooManyComponents { requested, max } => {
                write!(f, "filter over {} components exceeds the maximum of {}", requested, max)
            }
            FilterError::NotInGroup(e) => write!(f, "cannot filter: {e}"),
            FilterError::WrongCategory { type_index } => {
                write!(f, "type index {} is not a shared component", type_index)
            }
        }
    }
}

impl std::error::Error for FilterError {}

impl From<ComponentNotInGroupError> for FilterError {
    fn from(e: ComponentNotInGroupError) -> Self { FilterError::NotInGroup(e) }
}

/// Errors raised by access-mode and safety-handle checks.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// A write was attempted through a view declared read-only.
    ReadOnly {
        /// Registry index of the column.
        type_index: TypeIndex,
    },

    /// The same type was requested for both reading and writing.
    ReadAndWrite {
        /// Registry index of the column.
        type_index: TypeIndex,
    },

    /// Another holder currently owns a conflicting borrow of the column.
    Conflict {
        /// Registry index of the column.
        type_index: TypeIndex,
    },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::ReadOnly { type_index } => {
                write!(f, "component {} is declared read-only", type_index)
            }
            AccessError::ReadAndWrite { type_index } => {
                write!(f, "component {} requested for both read and write", type_index)
            }
            AccessError::Conflict { type_index } => {
                write!(f, "component {} is already borrowed with a conflicting access mode", type_index)
            }
        }
    }
}

impl std::error::Error for AccessError {}

/// Returned when an archetype cannot place even one entity into a chunk.
///
/// This is a configuration error: it is raised when the archetype is created
/// and never at iteration time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCapacityError {
    /// Name of the largest type in the archetype.
    pub type_name: &'static str,

    /// Bytes needed for a single row.
    pub size: usize,

    /// Configured chunk byte budget.
    pub chunk_bytes: usize,
}

impl fmt::Display for ChunkCapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row of {} bytes (largest type {}) does not fit in a {}-byte chunk",
            self.size, self.type_name, self.chunk_bytes
        )
    }
}

impl std::error::Error for ChunkCapacityError {}

/// Returned when a buffer alias is resolved after its storage moved.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleViewError {
    /// Safety version captured by the alias.
    pub expected: Version,

    /// Current safety version of the buffer.
    pub found: Version,
}

impl fmt::Display for StaleViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffer view invalidated by reallocation (view version {}, buffer version {})",
            self.expected, self.found
        )
    }
}

impl std::error::Error for StaleViewError {}

/// Returned when an entity handle was destroyed or its version is outdated.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError {
    /// The offending handle.
    pub entity: Entity,
}

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stale or dead entity reference {}", self.entity)
    }
}

impl std::error::Error for StaleEntityError {}

/// Returned when an entity does not carry the requested component.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingComponentError {
    /// Entity that was inspected.
    pub entity: Entity,

    /// Registry index of the missing type.
    pub type_index: TypeIndex,
}

impl fmt::Display for MissingComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {} has no component with type index {}", self.entity, self.type_index)
    }
}

impl std::error::Error for MissingComponentError {}

/// Errors raised by the component type registry.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The Rust type was never registered with this world.
    Unregistered {
        /// Rust type name.
        name: &'static str,
    },

    /// A type index outside the registry was used.
    UnknownIndex {
        /// Offending index.
        type_index: TypeIndex,
    },

    /// The registry is frozen and no longer accepts registrations.
    Frozen,

    /// The type was registered before under another category, or used with an
    /// API for a different category.
    CategoryMismatch {
        /// Rust type name.
        name: &'static str,
    },

    /// The type's alignment exceeds what the chunk layout supports.
    AlignmentTooLarge {
        /// Rust type name.
        name: &'static str,
        /// Alignment of the type.
        align: usize,
    },

    /// A zero-sized type was registered as plain data; register it as a tag.
    ZeroSizedData {
        /// Rust type name.
        name: &'static str,
    },

    /// A tag type has a non-zero size.
    SizedTag {
        /// Rust type name.
        name: &'static str,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Unregistered { name } => write!(f, "component {} is not registered", name),
            RegistryError::UnknownIndex { type_index } => write!(f, "unknown type index {}", type_index),
            RegistryError::Frozen => f.write_str("component registry is frozen"),
            RegistryError::CategoryMismatch { name } => {
                write!(f, "component {} is registered under a different category", name)
            }
            RegistryError::AlignmentTooLarge { name, align } => {
                write!(f, "component {} has unsupported alignment {}", name, align)
            }
            RegistryError::ZeroSizedData { name } => {
                write!(f, "component {} is zero-sized; register it as a tag", name)
            }
            RegistryError::SizedTag { name } => write!(f, "tag {} must be zero-sized", name),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Returned when a [`WorldConfig`](crate::engine::config::WorldConfig) is
/// invalid.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `chunk_bytes` is zero or not a multiple of the block size.
    ChunkBytes {
        /// Configured value.
        chunk_bytes: usize,
        /// Required multiple.
        block: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ChunkBytes { chunk_bytes, block } => write!(
                f,
                "chunk_bytes {} must be a non-zero multiple of {}",
                chunk_bytes, block
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Aggregate error for every public operation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// Flat index past the end of a view.
    IndexOutOfRange(IndexOutOfRangeError),

    /// Component not declared by the group.
    ComponentNotInGroup(ComponentNotInGroupError),

    /// Query lists a type as both required and absent.
    ConflictingQuery(ConflictingQueryError),

    /// Invalid filter configuration.
    Filter(FilterError),

    /// Access-mode or borrow violation.
    Access(AccessError),

    /// Archetype row does not fit in a chunk.
    ChunkCapacity(ChunkCapacityError),

    /// Buffer alias used after invalidation.
    StaleView(StaleViewError),

    /// Dead entity handle.
    StaleEntity(StaleEntityError),

    /// Component absent on the entity.
    MissingComponent(MissingComponentError),

    /// Registry failure.
    Registry(RegistryError),

    /// Invalid configuration.
    Config(ConfigError),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::IndexOutOfRange(e) => write!(f, "{e}"),
            EcsError::ComponentNotInGroup(e) => write!(f, "{e}"),
            EcsError::ConflictingQuery(e) => write!(f, "{e}"),
            EcsError::Filter(e) => write!(f, "{e}"),
            EcsError::Access(e) => write!(f, "{e}"),
            EcsError::ChunkCapacity(e) => write!(f, "{e}"),
            EcsError::StaleView(e) => write!(f, "{e}"),
            EcsError::StaleEntity(e) => write!(f, "{e}"),
            EcsError::MissingComponent(e) => write!(f, "{e}"),
            EcsError::Registry(e) => write!(f, "{e}"),
            EcsError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EcsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EcsError::IndexOutOfRange(e) => Some(e),
            EcsError::ComponentNotInGroup(e) => Some(e),
            EcsError::ConflictingQuery(e) => Some(e),
            EcsError::Filter(e) => Some(e),
            EcsError::Access(e) => Some(e),
            EcsError::ChunkCapacity(e) => Some(e),
            EcsError::StaleView(e) => Some(e),
            EcsError::StaleEntity(e) => Some(e),
            EcsError::MissingComponent(e) => Some(e),
            EcsError::Registry(e) => Some(e),
            EcsError::Config(e) => Some(e),
        }
    }
}

impl From<IndexOutOfRangeError> for EcsError {
    fn from(e: IndexOutOfRangeError) -> Self { EcsError::IndexOutOfRange(e) }
}
impl From<ComponentNotInGroupError> for EcsError {
    fn from(e: ComponentNotInGroupError) -> Self { EcsError::ComponentNotInGroup(e) }
}
impl From<ConflictingQueryError> for EcsError {
    fn from(e: ConflictingQueryError) -> Self { EcsError::ConflictingQuery(e) }
}
impl From<FilterError> for EcsError {
    fn from(e: FilterError) -> Self { EcsError::Filter(e) }
}
impl From<AccessError> for EcsError {
    fn from(e: AccessError) -> Self { EcsError::Access(e) }
}
impl From<ChunkCapacityError> for EcsError {
    fn from(e: ChunkCapacityError) -> Self { EcsError::ChunkCapacity(e) }
}
impl From<StaleViewError> for EcsError {
    fn from(e: StaleViewError) -> Self { EcsError::StaleView(e) }
}
impl From<StaleEntityError> for EcsError {
    fn from(e: StaleEntityError) -> Self { EcsError::StaleEntity(e) }
}
impl From<MissingComponentError> for EcsError {
    fn from(e: MissingComponentError) -> Self { EcsError::MissingComponent(e) }
}
impl From<RegistryError> for EcsError {
    fn from(e: RegistryError) -> Self { EcsError::Registry(e) }
}
impl From<ConfigError> for EcsError {
    fn from(e: ConfigError) -> Self { EcsError::Config(e) }
}
