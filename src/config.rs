//! Construction-time configuration.

use crate::error::MapError;
use serde::{Deserialize, Serialize};

/// Partition count used by `ShardedMap::new`.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Settings fixed for the lifetime of a map. Missing fields fall back to
/// their defaults when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Number of independently locked partitions. Never changes after
    /// construction.
    pub shard_count: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }
}

impl ShardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    pub fn validate(&self) -> Result<(), MapError> {
        if self.shard_count == 0 {
            return Err(MapError::InvalidShardCount(self.shard_count));
        }
        Ok(())
    }
}
