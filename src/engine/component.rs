//! # Component Registry
//!
//! Assigns stable [`TypeIndex`] values to Rust component types and records the
//! metadata (size, alignment, category) that archetype layout needs.
//!
//! ## Design
//! - Each world owns its registry; there is no process-wide table, so
//!   independent worlds (e.g. in tests) never interfere.
//! - Types are registered once per category. Registering the same type again
//!   under the same category returns the existing index.
//! - Three built-in types are registered by every registry on construction:
//!   the implicit [`Entity`] column (always type index `0`, hence always the
//!   first column of every archetype), and the [`Disabled`] and [`Prefab`] tags
//!   that normal queries silently skip.
//! - The registry can be [`freeze`](ComponentRegistry::freeze)d once setup is
//!   done; later registrations fail instead of quietly growing the table.
//!
//! ## Invariants
//! - `descs[i].type_index == i` for every registered type.
//! - A `TypeIndex` never changes meaning for the lifetime of the world.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    fmt,
    mem::{align_of, size_of},
};

use bytemuck::Pod;

use crate::engine::entity::Entity;
use crate::engine::error::RegistryError;
use crate::engine::types::{
    ComponentCategory, ComponentType, TypeIndex, ENTITY_TYPE_INDEX, MAX_COMPONENT_ALIGN,
};


/// Plain-data component stored in a per-entity chunk column.
///
/// Any `Pod` type qualifies; columns are raw bytes reinterpreted through
/// `bytemuck`, so the type must be valid for every bit pattern.
pub trait Component: Pod + Send + Sync + 'static {}

impl<T> Component for T where T: Pod + Send + Sync + 'static {}

/// Element type of a dynamic buffer component.
pub trait BufferElement: Pod + Send + Sync + 'static {}

impl<T> BufferElement for T where T: Pod + Send + Sync + 'static {}

/// Value shared by all entities in a chunk.
///
/// `Default` provides the value every entity starts with (value index `0`).
pub trait SharedComponent: Clone + PartialEq + Default + Send + Sync + 'static {}

impl<T> SharedComponent for T where T: Clone + PartialEq + Default + Send + Sync + 'static {}

/// Built-in tag marking disabled entities.
///
/// Archetypes containing it only match groups that explicitly require it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Disabled;

/// Built-in tag marking prefab entities.
///
/// Archetypes containing it only match groups that explicitly require it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Prefab;

/// Describes a registered component type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentDesc {
    /// Runtime identifier assigned by the registry.
    pub type_index: TypeIndex,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,

    /// `size_of::<T>()`; for buffers this is the element size.
    pub size: usize,

    /// `align_of::<T>()`; for buffers this is the element alignment.
    pub align: usize,

    /// Storage category.
    pub category: ComponentCategory,
}

impl ComponentDesc {
    /// Constructs a descriptor for `T` with a placeholder index.
    #[inline]
    pub fn of<T: 'static>(category: ComponentCategory) -> Self {
        Self {
            type_index: 0,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            category,
        }
    }

    /// Bytes this type occupies per row inside a chunk's byte arena.
    ///
    /// Only plain-data columns live in the arena; tags and shared values
    /// take no per-row space, and buffer cells are stored beside the arena.

    #[inline]
    pub fn chunk_stride(&self) -> usize {
        match self.category {
            ComponentCategory::Data => self.size,
            _ => 0,
        }
    }

    #[inline]
    fn with_index(mut self, type_index: TypeIndex) -> Self {
        self.type_index = type_index;
        self
    }
}

impl fmt::Display for ComponentDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ComponentDesc {{ index: {}, name: {}, size: {}, align: {}, category: {:?} }}",
            self.type_index, self.name, self.size, self.align, self.category
        )
    }
}

/// Per-world mapping between Rust types and type indices.
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, TypeIndex>,
    descs: Vec<ComponentDesc>,
    frozen: bool,
    disabled: TypeIndex,
    prefab: TypeIndex,
}

impl Default for ComponentRegistry {
    fn default() -> Self { Self::new() }
}

impl ComponentRegistry {

    /// Creates a registry holding only the built-in types.
    pub fn new() -> Self {
        let mut registry = Self {
            by_type: HashMap::new(),
            descs: Vec::new(),
            frozen: false,
            disabled: 0,
            prefab: 0,
        };

        let entity = registry.insert(ComponentDesc::of::<Entity>(ComponentCategory::Data));
        debug_assert_eq!(entity, ENTITY_TYPE_INDEX);
        registry.disabled = registry.insert(ComponentDesc::of::<Disabled>(ComponentCategory::Tag));
        registry.prefab = registry.insert(ComponentDesc::of::<Prefab>(ComponentCategory::Tag));
        registry
    }

    fn insert(&mut self, desc: ComponentDesc) -> TypeIndex {
        let type_index = self.descs.len() as TypeIndex;
        self.by_type.insert(desc.type_id, type_index);
        self.descs.push(desc.with_index(type_index));
        type_index
    }

    fn register_as<T: 'static>(&mut self, category: ComponentCategory) -> Result<TypeIndex, RegistryError> {
        let desc = ComponentDesc::of::<T>(category);

        if let Some(&existing) = self.by_type.get(&desc.type_id) {
            if self.descs[existing as usize].category != category {
                return Err(RegistryError::CategoryMismatch { name: desc.name });
            }
            return Ok(existing);
        }

        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        if desc.align > MAX_COMPONENT_ALIGN {
            return Err(RegistryError::AlignmentTooLarge { name: desc.name, align: desc.align });
        }
        match category {
            ComponentCategory::Data | ComponentCategory::Buffer if desc.size == 0 => {
                return Err(RegistryError::ZeroSizedData { name: desc.name });
            }
            ComponentCategory::Tag if desc.size != 0 => {
                return Err(RegistryError::SizedTag { name: desc.name });
            }
            _ => {}
        }

        let type_index = self.insert(desc);
        log::debug!("registered component {} as {:?} (type index {})", desc.name, category, type_index);
        Ok(type_index)
    }

    /// Registers a plain-data component.
    pub fn register<T: Component>(&mut self) -> Result<TypeIndex, RegistryError> {
        self.register_as::<T>(ComponentCategory::Data)
    }

    /// Registers a zero-sized tag component.
    pub fn register_tag<T: Send + Sync + 'static>(&mut self) -> Result<TypeIndex, RegistryError> {
        self.register_as::<T>(ComponentCategory::Tag)
    }

    /// Registers a dynamic buffer component whose elements are `T`.
    pub fn register_buffer<T: BufferElement>(&mut self) -> Result<TypeIndex, RegistryError> {
        self.register_as::<T>(ComponentCategory::Buffer)
    }

    /// Registers a shared component.
    pub fn register_shared<T: SharedComponent>(&mut self) -> Result<TypeIndex, RegistryError> {
        self.register_as::<T>(ComponentCategory::Shared)
    }

    /// Prevents further registrations.
    pub fn freeze(&mut self) { self.frozen = true; }

    /// Returns `true` once [`freeze`](Self::freeze) was called.
    pub fn is_frozen(&self) -> bool { self.frozen }

    /// Number of registered types, built-ins included.
    pub fn len(&self) -> usize { self.descs.len() }

    /// Always `false`: built-ins are registered on construction.
    pub fn is_empty(&self) -> bool { self.descs.is_empty() }

    /// Type index of the built-in `Disabled` tag.
    #[inline]
    pub fn disabled_index(&self) -> TypeIndex { self.disabled }

    /// Type index of the built-in `Prefab` tag.
    #[inline]
    pub fn prefab_index(&self) -> TypeIndex { self.prefab }

    /// Index of `T`, if registered.
    pub fn index_of<T: 'static>(&self) -> Option<TypeIndex> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Index of `T`, or `Unregistered`.
    pub fn require<T: 'static>(&self) -> Result<TypeIndex, RegistryError> {
        self.index_of::<T>()
            .ok_or(RegistryError::Unregistered { name: type_name::<T>() })
    }

    /// Index of `T`, checking that it was registered as `category`.
    pub fn require_category<T: 'static>(&self, category: ComponentCategory) -> Result<TypeIndex, RegistryError> {
        let type_index = self.require::<T>()?;
        if self.descs[type_index as usize].category != category {
            return Err(RegistryError::CategoryMismatch { name: type_name::<T>() });
        }
        Ok(type_index)
    }

    /// Descriptor for `type_index`.
    pub fn desc(&self, type_index: TypeIndex) -> Result<&ComponentDesc, RegistryError> {
        self.descs
            .get(type_index as usize)
            .ok_or(RegistryError::UnknownIndex { type_index })
    }

    /// Read-write handle for `T`.
    pub fn read_write<T: 'static>(&self) -> Result<ComponentType, RegistryError> {
        Ok(ComponentType::read_write(self.require::<T>()?))
    }

    /// Read-only handle for `T`.
    pub fn read_only<T: 'static>(&self) -> Result<ComponentType, RegistryError> {
        Ok(ComponentType::read_only(self.require::<T>()?))
    }

    /// Subtractive handle for `T`.
    pub fn subtractive<T: 'static>(&self) -> Result<ComponentType, RegistryError> {
        Ok(ComponentType::subtractive(self.require::<T>()?))
    }
}
