//! sharded-map: a string-keyed concurrent map split into independently
//! locked partitions, so operations on unrelated keys proceed in parallel.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a shared in-memory map where single-key operations contend only
//!   with operations on the same partition, never on a global lock.
//! - Layers:
//!   - `router`: pure `route(key, n)` (32-bit FNV over the key bytes, mod n).
//!   - `Partition<V, S>`: a `hashbrown::HashMap` behind a `parking_lot`
//!     reader-writer lock; every operation holds the lock for exactly its
//!     own duration.
//!   - `ShardedMap<V, S>`: a fixed boxed slice of partitions. Single-key
//!     operations route to one partition; aggregates visit all of them.
//!   - `snapshot`: fan-out/fan-in pipeline behind `iter`/`iter_buffered`.
//!
//! Constraints
//! - Shard count is fixed at construction (default 32); no resharding.
//! - A key lives in exactly one partition, the one the router names.
//!   Partitions handed out by the map are read-only; all writes route.
//! - No operation holding a partition lock ever acquires another one.
//! - Values are cloned out of the map (`get`, iteration); `with_value`
//!   and `for_each` borrow under the read lock instead.
//!
//! Consistency
//! - Within a partition, operations are linearizable.
//! - Aggregates (`count`, `keys`, `items`, iteration) are consistent per
//!   partition at the moment that partition's lock was held, but not a
//!   single snapshot of the whole map under concurrent writes.
//!
//! Combinators and callbacks
//! - `update_or_insert` combinators run under the owning partition's write
//!   lock; `for_each` callbacks run under each partition's read lock. Both
//!   must not call back into the same map. Debug builds detect this with a
//!   per-thread reentrancy guard and panic instead of deadlocking.
//! - A panicking combinator writes nothing; locks do not poison.
//!
//! Iteration
//! - Every partition is copied into its own closed channel under its read
//!   lock, concurrently. Forwarding threads merge those channels into one
//!   output channel that the returned `Iter` drains lazily.
//! - `iter` uses a rendezvous output channel (backpressure all the way to
//!   the forwarders); `iter_buffered` sizes it to the snapshot total.
//! - Dropping an unfinished `Iter` disconnects the output channel and joins
//!   every forwarder, so abandoned iterations never leak threads.
//!
//! Notes and non-goals
//! - No persistence, eviction, cross-partition transactions or ordering.
//! - Serialization (`serde`) goes through `items()`. Besides construction
//!   with an invalid shard count, it is the only map operation that can
//!   fail on its own.

mod config;
mod error;
mod map;
pub mod partition;
mod reentrancy;
pub mod router;
mod snapshot;

#[cfg(test)]
mod map_proptest;

// Public surface
pub use config::{ShardConfig, DEFAULT_SHARD_COUNT};
pub use error::MapError;
pub use map::ShardedMap;
pub use partition::Partition;
pub use snapshot::{Iter, Tuple};
