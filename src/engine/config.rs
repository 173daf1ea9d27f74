//! World configuration.
//!
//! Tunables that used to be compile-time constants are grouped here so that
//! several worlds with different chunk budgets can coexist (tests use a small
//! budget to exercise chunk boundaries with few entities).

use crate::engine::chunk::BLOCK_BYTES;
use crate::engine::error::ConfigError;
use crate::engine::types::DEFAULT_CHUNK_BYTES;


/// Settings fixed for the lifetime of a [`World`](crate::World).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorldConfig {
    /// Byte budget of every chunk. Must be a non-zero multiple of the block
    /// size (16 bytes).
    pub chunk_bytes: usize,

    /// Keep freed chunk buffers pooled for reuse instead of returning them to
    /// the allocator.
    pub keep_empty_chunk: bool,

    /// Track buffer safety versions so stale aliases are reported. Defaults to
    /// on in debug builds only.
    pub safety_checks: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            keep_empty_chunk: true,
            safety_checks: cfg!(debug_assertions),
        }
    }
}

impl WorldConfig {
    /// Sets the chunk byte budget.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    /// Sets the empty-chunk pooling policy.
    pub fn with_keep_empty_chunk(mut self, keep: bool) -> Self {
        self.keep_empty_chunk = keep;
        self
    }

    /// Enables or disables safety-version tracking.
    pub fn with_safety_checks(mut self, enabled: bool) -> Self {
        self.safety_checks = enabled;
        self
    }

    /// Checks the configuration for values the chunk allocator cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_bytes == 0 || self.chunk_bytes % BLOCK_BYTES != 0 {
            return Err(ConfigError::ChunkBytes { chunk_bytes: self.chunk_bytes, block: BLOCK_BYTES });
        }
        Ok(())
    }
}
