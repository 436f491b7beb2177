//! Partition: one independently locked segment of a `ShardedMap`.
//!
//! Every method acquires the partition's lock, does its work and releases
//! it before returning; no lock is held across a call boundary. Writers
//! take the lock exclusively, readers share it.

use crate::reentrancy::DebugReentrancy;
use crate::snapshot::Tuple;
use core::hash::BuildHasher;
use crossbeam_channel::{bounded, Receiver};
use hashbrown::hash_map::{DefaultHashBuilder, Entry};
use hashbrown::HashMap;
use parking_lot::RwLock;

/// One partition of a [`ShardedMap`](crate::ShardedMap).
///
/// Handed out by `ShardedMap::partition` for inspection only. Writes go
/// through the map so every key stays in the partition the router names:
///
/// ```compile_fail
/// let m: sharded_map::ShardedMap<i32> = sharded_map::ShardedMap::new();
/// m.partition(0).unwrap().set("k".to_string(), 1);
/// ```
pub struct Partition<V, S = DefaultHashBuilder> {
    items: RwLock<HashMap<String, V, S>>,
    reentrancy: DebugReentrancy,
}

impl<V, S> Partition<V, S>
where
    S: BuildHasher,
{
    pub(crate) fn with_hasher(hasher: S, reentrancy: DebugReentrancy) -> Self {
        Self {
            items: RwLock::new(HashMap::with_hasher(hasher)),
            reentrancy,
        }
    }

    /// Clone of the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        let _g = self.reentrancy.enter();
        self.items.read().get(key).cloned()
    }

    /// Run `f` against the stored value under the read lock, without cloning.
    pub fn with_value<R, F>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        let _g = self.reentrancy.enter();
        self.items.read().get(key).map(f)
    }

    /// Insert or overwrite.
    pub(crate) fn set(&self, key: String, value: V) {
        let _g = self.reentrancy.enter();
        self.items.write().insert(key, value);
    }

    /// Apply several writes under a single lock hold, in the order given.
    pub(crate) fn set_many<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let _g = self.reentrancy.enter();
        let mut items = self.items.write();
        for (key, value) in entries {
            items.insert(key, value);
        }
    }

    /// Insert only if `key` is absent. Returns whether the insert happened;
    /// an existing value is left untouched.
    pub(crate) fn set_if_absent(&self, key: String, value: V) -> bool {
        let _g = self.reentrancy.enter();
        match self.items.write().entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub(crate) fn remove(&self, key: &str) {
        let _g = self.reentrancy.enter();
        self.items.write().remove(key);
    }

    /// Remove and return the value in one critical section.
    pub(crate) fn pop(&self, key: &str) -> Option<V> {
        let _g = self.reentrancy.enter();
        self.items.write().remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        let _g = self.reentrancy.enter();
        self.items.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        let _g = self.reentrancy.enter();
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-modify-write under the write lock.
    ///
    /// `combine(existed, current, candidate)` runs while the lock is held;
    /// its result is stored under `key` and returned. If `combine` panics
    /// nothing is written and the lock is released during unwinding.
    pub(crate) fn update_or_insert<F>(&self, key: String, candidate: V, combine: F) -> V
    where
        V: Clone,
        F: FnOnce(bool, Option<&V>, V) -> V,
    {
        let _g = self.reentrancy.enter();
        let mut items = self.items.write();
        match items.get_mut(key.as_str()) {
            Some(slot) => {
                let next = combine(true, Some(&*slot), candidate);
                *slot = next.clone();
                next
            }
            None => {
                let next = combine(false, None, candidate);
                items.insert(key, next.clone());
                next
            }
        }
    }

    /// Fallible `update_or_insert`: on `Err` the entry is left as it was.
    pub(crate) fn try_update_or_insert<F, E>(
        &self,
        key: String,
        candidate: V,
        combine: F,
    ) -> Result<V, E>
    where
        V: Clone,
        F: FnOnce(bool, Option<&V>, V) -> Result<V, E>,
    {
        let _g = self.reentrancy.enter();
        let mut items = self.items.write();
        match items.get_mut(key.as_str()) {
            Some(slot) => {
                let next = combine(true, Some(&*slot), candidate)?;
                *slot = next.clone();
                Ok(next)
            }
            None => {
                let next = combine(false, None, candidate)?;
                items.insert(key, next.clone());
                Ok(next)
            }
        }
    }

    /// Visit every entry with the read lock held for the whole pass.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &V),
    {
        let _g = self.reentrancy.enter();
        for (key, value) in self.items.read().iter() {
            f(key, value);
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let _g = self.reentrancy.enter();
        self.items.read().keys().cloned().collect()
    }

    /// Copy every entry into a closed channel sized to the entry count.
    ///
    /// The read lock is released before this returns, so later writes to
    /// the partition are invisible to whoever drains the channel.
    pub(crate) fn snapshot(&self) -> Receiver<Tuple<V>>
    where
        V: Clone,
    {
        let _g = self.reentrancy.enter();
        let items = self.items.read();
        let (tx, rx) = bounded(items.len());
        for (key, value) in items.iter() {
            // Capacity equals the entry count and `rx` is alive: never blocks or fails.
            let _ = tx.send(Tuple::new(key.clone(), value.clone()));
        }
        rx
    }

    pub(crate) fn clear(&self) {
        let _g = self.reentrancy.enter();
        self.items.write().clear();
    }
}
