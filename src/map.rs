//! ShardedMap: one logical string-keyed map over N independent partitions.

use crate::config::{ShardConfig, DEFAULT_SHARD_COUNT};
use crate::error::MapError;
use crate::partition::Partition;
use crate::reentrancy::DebugReentrancy;
use crate::router::route;
use crate::snapshot::{self, Iter, Tuple};
use core::fmt;
use core::hash::BuildHasher;
use core::marker::PhantomData;
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;
use serde::de::{Deserialize, DeserializeOwned, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use tracing::debug;

pub struct ShardedMap<V, S = DefaultHashBuilder> {
    partitions: Box<[Partition<V, S>]>,
    reentrancy: DebugReentrancy,
}

impl<V> ShardedMap<V> {
    /// Map with the default 32 partitions.
    pub fn new() -> Self {
        Self::build(DEFAULT_SHARD_COUNT, DefaultHashBuilder::default())
    }

    pub fn with_shards(shard_count: usize) -> Result<Self, MapError> {
        Self::with_shards_and_hasher(shard_count, DefaultHashBuilder::default())
    }

    pub fn with_config(config: &ShardConfig) -> Result<Self, MapError> {
        Self::with_shards(config.shard_count)
    }
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> ShardedMap<V, S>
where
    S: BuildHasher + Clone,
{
    /// `hasher` drives the per-partition tables only; partition routing
    /// always uses the fixed FNV router.
    pub fn with_shards_and_hasher(shard_count: usize, hasher: S) -> Result<Self, MapError> {
        ShardConfig::new()
            .with_shard_count(shard_count)
            .validate()?;
        Ok(Self::build(shard_count, hasher))
    }

    fn build(shard_count: usize, hasher: S) -> Self {
        let reentrancy = DebugReentrancy::new();
        let partitions = (0..shard_count)
            .map(|_| Partition::with_hasher(hasher.clone(), reentrancy.clone()))
            .collect();
        debug!(shard_count, "created sharded map");
        Self {
            partitions,
            reentrancy,
        }
    }
}

impl<V, S> ShardedMap<V, S>
where
    S: BuildHasher,
{
    pub fn shard_count(&self) -> usize {
        self.partitions.len()
    }

    /// Index of the partition that owns `key`.
    pub fn shard_index(&self, key: &str) -> usize {
        route(key, self.partitions.len())
    }

    /// Read-only access to one partition, for inspecting how keys spread.
    pub fn partition(&self, index: usize) -> Option<&Partition<V, S>> {
        self.partitions.get(index)
    }

    pub fn partition_for(&self, key: &str) -> &Partition<V, S> {
        &self.partitions[self.shard_index(key)]
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        self.partition_for(&key).set(key, value);
    }

    /// Apply `set` for every entry. Entries are grouped by partition and each
    /// group is written under one lock hold, preserving the given order
    /// within a partition. There is no atomicity across partitions.
    pub fn multi_set<I, K>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let mut groups: Vec<Vec<(String, V)>> = std::iter::repeat_with(Vec::new)
            .take(self.partitions.len())
            .collect();
        for (key, value) in entries {
            let key = key.into();
            let idx = self.shard_index(&key);
            groups[idx].push((key, value));
        }
        for (partition, group) in self.partitions.iter().zip(groups) {
            if !group.is_empty() {
                partition.set_many(group);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.partition_for(key).get(key)
    }

    /// Borrowing lookup: runs `f` on the stored value under the read lock.
    pub fn with_value<R, F>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        self.partition_for(key).with_value(key, f)
    }

    pub fn has(&self, key: &str) -> bool {
        self.partition_for(key).has(key)
    }

    pub fn remove(&self, key: &str) {
        self.partition_for(key).remove(key)
    }

    pub fn pop(&self, key: &str) -> Option<V> {
        self.partition_for(key).pop(key)
    }

    pub fn set_if_absent(&self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        self.partition_for(&key).set_if_absent(key, value)
    }

    /// Atomic read-modify-write of one key.
    ///
    /// `combine(existed, current, candidate)` runs under the owning
    /// partition's write lock and must not touch this map. Its result is
    /// stored and returned.
    pub fn update_or_insert<F>(&self, key: impl Into<String>, candidate: V, combine: F) -> V
    where
        V: Clone,
        F: FnOnce(bool, Option<&V>, V) -> V,
    {
        let key = key.into();
        self.partition_for(&key).update_or_insert(key, candidate, combine)
    }

    pub fn try_update_or_insert<F, E>(
        &self,
        key: impl Into<String>,
        candidate: V,
        combine: F,
    ) -> Result<V, E>
    where
        V: Clone,
        F: FnOnce(bool, Option<&V>, V) -> Result<V, E>,
    {
        let key = key.into();
        self.partition_for(&key).try_update_or_insert(key, candidate, combine)
    }

    /// Sum of partition sizes, each read under its own lock in turn. Under
    /// concurrent writes this is not a single point-in-time count.
    pub fn count(&self) -> usize {
        self.partitions.iter().map(Partition::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Visit partitions in index order, holding each read lock for the
    /// whole partition. `f` runs on the calling thread and must not touch
    /// this map.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &V),
    {
        for partition in self.partitions.iter() {
            partition.for_each(&mut f);
        }
    }

    pub fn clear(&self) {
        for partition in self.partitions.iter() {
            partition.clear();
        }
    }
}

impl<V, S> ShardedMap<V, S>
where
    V: Send + Sync,
    S: BuildHasher + Send + Sync,
{
    /// All keys, collected from every partition concurrently. Unordered.
    pub fn keys(&self) -> Vec<String> {
        self.reentrancy.assert_not_entered();
        snapshot::scatter(&self.partitions, Partition::keys)
            .into_iter()
            .flatten()
            .collect()
    }
}

impl<V, S> ShardedMap<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Send + Sync,
{
    /// Lazy snapshot iteration with full backpressure: each forwarder waits
    /// until the consumer takes its next item.
    pub fn iter(&self) -> Iter<V> {
        self.reentrancy.assert_not_entered();
        snapshot::fan_in(snapshot::fan_out(&self.partitions), 0)
    }

    /// Lazy snapshot iteration over an output channel sized to the whole
    /// snapshot, so forwarders never wait on the consumer.
    pub fn iter_buffered(&self) -> Iter<V> {
        self.reentrancy.assert_not_entered();
        let channels = snapshot::fan_out(&self.partitions);
        let total = channels.iter().map(|c| c.len()).sum();
        snapshot::fan_in(channels, total)
    }

    /// Full copy of the map, built by draining a buffered snapshot.
    pub fn items(&self) -> HashMap<String, V> {
        self.iter_buffered().map(Tuple::into_pair).collect()
    }

    /// The object form of `items()` as JSON bytes.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, MapError>
    where
        V: Serialize,
    {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<V> ShardedMap<V>
where
    V: DeserializeOwned,
{
    /// Rebuild a default-configured map from its JSON object form.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, MapError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<V, S> Serialize for ShardedMap<V, S>
where
    V: Serialize + Clone + Send + Sync + 'static,
    S: BuildHasher + Send + Sync,
{
    fn serialize<Ser>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error>
    where
        Ser: Serializer,
    {
        serializer.collect_map(self.items())
    }
}

impl<'de, V> Deserialize<'de> for ShardedMap<V>
where
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ShardedMapVisitor(PhantomData))
    }
}

struct ShardedMapVisitor<V>(PhantomData<V>);

impl<'de, V> Visitor<'de> for ShardedMapVisitor<V>
where
    V: Deserialize<'de>,
{
    type Value = ShardedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map with string keys")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let map = ShardedMap::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            map.set(key, value);
        }
        Ok(map)
    }
}

impl<V, K> FromIterator<(K, V)> for ShardedMap<V>
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = ShardedMap::new();
        map.multi_set(iter);
        map
    }
}

impl<V, S, K> Extend<(K, V)> for ShardedMap<V, S>
where
    S: BuildHasher,
    K: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.multi_set(iter);
    }
}

impl<V, S> fmt::Debug for ShardedMap<V, S>
where
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedMap")
            .field("shards", &self.shard_count())
            .field("len", &self.count())
            .finish()
    }
}
