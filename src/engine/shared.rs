//! Shared component values.
//!
//! A shared component is stored once per chunk: the chunk keeps a small value
//! index per shared type and the actual values live here, deduplicated by
//! equality. Value index `0` of every shared type is always `T::default()`, so
//! freshly created entities need no explicit shared value.
//!
//! The store is append-only. Indices handed out stay valid for the lifetime of
//! the world, which is what lets chunk placement and shared filters compare
//! plain integers.

use std::any::{type_name, Any};
use std::collections::HashMap;

use crate::engine::component::SharedComponent;
use crate::engine::error::RegistryError;
use crate::engine::types::TypeIndex;


/// Per-type lists of distinct shared values.
#[derive(Default)]
pub struct SharedComponentStore {
    values: HashMap<TypeIndex, Box<dyn Any + Send + Sync>>,
}

impl SharedComponentStore {
    /// Creates an empty store.
    pub fn new() -> Self { Self::default() }

    /// Creates the value list for `type_index`, seeded with `T::default()`.
    pub fn ensure<T: SharedComponent>(&mut self, type_index: TypeIndex) {
        self.values
            .entry(type_index)
            .or_insert_with(|| Box::new(vec![T::default()]));
    }

    fn list<T: SharedComponent>(&self, type_index: TypeIndex) -> Result<&Vec<T>, RegistryError> {
        self.values
            .get(&type_index)
            .ok_or(RegistryError::UnknownIndex { type_index })?
            .downcast_ref::<Vec<T>>()
            .ok_or(RegistryError::CategoryMismatch { name: type_name::<T>() })
    }

    fn list_mut<T: SharedComponent>(&mut self, type_index: TypeIndex) -> Result<&mut Vec<T>, RegistryError> {
        self.values
            .get_mut(&type_index)
            .ok_or(RegistryError::UnknownIndex { type_index })?
            .downcast_mut::<Vec<T>>()
            .ok_or(RegistryError::CategoryMismatch { name: type_name::<T>() })
    }

    /// Returns the index of `value`, appending it if it was never seen.
    pub fn insert_or_find<T: SharedComponent>(&mut self, type_index: TypeIndex, value: T) -> Result<u32, RegistryError> {
        let list = self.list_mut::<T>(type_index)?;
        if let Some(index) = list.iter().position(|v| *v == value) {
            return Ok(index as u32);
        }
        list.push(value);
        let index = (list.len() - 1) as u32;
        log::trace!("new shared value {} for {}", index, type_name::<T>());
        Ok(index)
    }

    /// Index of `value`, if it was ever inserted.
    pub fn find_index<T: SharedComponent>(&self, type_index: TypeIndex, value: &T) -> Result<Option<u32>, RegistryError> {
        Ok(self.list::<T>(type_index)?.iter().position(|v| v == value).map(|i| i as u32))
    }

    /// Value stored under `value_index`.
    pub fn get<T: SharedComponent>(&self, type_index: TypeIndex, value_index: u32) -> Result<&T, RegistryError> {
        self.list::<T>(type_index)?
            .get(value_index as usize)
            .ok_or(RegistryError::UnknownIndex { type_index })
    }

    /// Number of distinct values of `type_index`, the default included.
    pub fn value_count<T: SharedComponent>(&self, type_index: TypeIndex) -> Result<usize, RegistryError> {
        Ok(self.list::<T>(type_index)?.len())
    }
}
