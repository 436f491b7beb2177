//! Error type for the few map operations that can fail.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    /// A map needs at least one partition.
    #[error("shard count must be at least 1, got {0}")]
    InvalidShardCount(usize),

    /// Encoding the map to, or decoding it from, its object form failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
