//! # Engine Module
//!
//! Storage engine internals, leaves first:
//! - Identifiers, errors and configuration
//! - Component registry and entity location table
//! - Chunk allocator and archetype registry
//! - Group matcher and chunk filters
//! - Chunk iterator and typed views
//! - Access tracking and the world context
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod component;
pub mod entity;
pub mod chunk;
pub mod buffer;
pub mod archetype;
pub mod shared;
pub mod group;
pub mod filter;
pub mod iterator;
pub mod views;
pub mod safety;
pub mod world;
