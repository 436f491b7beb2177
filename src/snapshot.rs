//! Snapshot pipeline: fan-out over partitions, fan-in into one sequence.
//!
//! 1. Fan-out: one thread per partition takes the read lock, copies the
//!    partition into a channel sized to its entry count, releases the lock
//!    and closes the channel.
//! 2. Fan-in: one forwarding thread per partition channel moves entries
//!    into a shared output channel, which closes once every forwarder is
//!    done.
//! 3. The caller drains the output through [`Iter`].
//!
//! The output channel is either a rendezvous channel (each forwarder waits
//! for the consumer) or pre-sized to the snapshot total (forwarders never
//! wait). Dropping or cancelling the `Iter` drops the only output
//! receiver; blocked forwarders then fail their `send`, exit, and are
//! joined, so an abandoned iteration leaves no background work behind.

use crate::partition::Partition;
use core::hash::BuildHasher;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fmt;
use std::iter::FusedIterator;
use std::panic;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

/// One `(key, value)` item produced by iteration. Detached from the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple<V> {
    pub key: String,
    pub value: V,
}

impl<V> Tuple<V> {
    pub fn new(key: String, value: V) -> Self {
        Self { key, value }
    }

    pub fn into_pair(self) -> (String, V) {
        (self.key, self.value)
    }
}

impl<V> From<Tuple<V>> for (String, V) {
    fn from(t: Tuple<V>) -> Self {
        t.into_pair()
    }
}

/// Run `job` on every partition concurrently, one scoped thread each, and
/// return the results in partition order. A partition whose thread cannot
/// be spawned runs on the calling thread instead.
pub(crate) fn scatter<V, S, R, F>(partitions: &[Partition<V, S>], job: F) -> Vec<R>
where
    V: Send + Sync,
    S: BuildHasher + Send + Sync,
    R: Send,
    F: Fn(&Partition<V, S>) -> R + Sync,
{
    let job = &job;
    thread::scope(|scope| {
        let spawned: Vec<_> = partitions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let handle = thread::Builder::new()
                    .name(format!("shard-scatter-{i}"))
                    .spawn_scoped(scope, move || job(p));
                (i, p, handle)
            })
            .collect();

        spawned
            .into_iter()
            .map(|(i, p, handle)| match handle {
                Ok(h) => h.join().unwrap_or_else(|e| panic::resume_unwind(e)),
                Err(err) => {
                    error!(shard = i, %err, "failed to spawn partition worker; running inline");
                    job(p)
                }
            })
            .collect()
    })
}

/// Fan-out stage: a closed, fully populated channel per partition.
pub(crate) fn fan_out<V, S>(partitions: &[Partition<V, S>]) -> Vec<Receiver<Tuple<V>>>
where
    V: Clone + Send + Sync,
    S: BuildHasher + Send + Sync,
{
    scatter(partitions, Partition::snapshot)
}

/// Fan-in stage: merge `channels` into one output channel of `capacity`
/// slots (zero for a rendezvous channel).
pub(crate) fn fan_in<V>(channels: Vec<Receiver<Tuple<V>>>, capacity: usize) -> Iter<V>
where
    V: Send + 'static,
{
    let (tx, rx) = bounded(capacity);
    let mut forwarders = Vec::with_capacity(channels.len());
    let mut stranded = Vec::new();

    for (i, source) in channels.into_iter().enumerate() {
        let worker_source = source.clone();
        let out = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("shard-fan-in-{i}"))
            .spawn(move || forward(worker_source, out));
        match spawned {
            Ok(h) => forwarders.push(h),
            Err(err) => {
                // The channel is already full and closed; the iterator drains
                // it directly once the shared channel is exhausted.
                error!(shard = i, %err, "failed to spawn fan-in forwarder; draining inline");
                stranded.push(source);
            }
        }
    }
    // Only forwarders hold senders now: the output closes when they finish.
    drop(tx);

    debug!(forwarders = forwarders.len(), capacity, "started fan-in");
    Iter {
        rx: Some(rx),
        forwarders,
        stranded,
    }
}

fn forward<V>(source: Receiver<Tuple<V>>, out: Sender<Tuple<V>>) {
    for t in source.iter() {
        if out.send(t).is_err() {
            // Consumer is gone.
            return;
        }
    }
}

/// Lazy, finite, non-restartable sequence over a map snapshot.
///
/// Items arrive in no particular order. Dropping the iterator before it is
/// exhausted cancels the pipeline and joins its threads.
pub struct Iter<V> {
    rx: Option<Receiver<Tuple<V>>>,
    forwarders: Vec<JoinHandle<()>>,
    stranded: Vec<Receiver<Tuple<V>>>,
}

impl<V> Iter<V> {
    /// Stop the pipeline: disconnect the output channel, discard anything
    /// not yet consumed and wait for every forwarder to exit. Further calls
    /// to `next` return `None`.
    pub fn cancel(&mut self) {
        if self.rx.is_none() && self.stranded.is_empty() && self.forwarders.is_empty() {
            return;
        }
        trace!(forwarders = self.forwarders.len(), "cancelling snapshot iteration");
        self.rx = None;
        self.stranded.clear();
        self.join_forwarders();
    }

    fn join_forwarders(&mut self) {
        for h in self.forwarders.drain(..) {
            if h.join().is_err() {
                error!("fan-in forwarder panicked");
            }
        }
    }
}

impl<V> Iterator for Iter<V> {
    type Item = Tuple<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(rx) = &self.rx {
            match rx.recv() {
                Ok(t) => return Some(t),
                Err(_) => {
                    // Every forwarder has dropped its sender.
                    self.rx = None;
                    self.join_forwarders();
                }
            }
        }
        while let Some(source) = self.stranded.last() {
            match source.try_recv() {
                Ok(t) => return Some(t),
                Err(_) => {
                    self.stranded.pop();
                }
            }
        }
        None
    }
}

impl<V> FusedIterator for Iter<V> {}

impl<V> Drop for Iter<V> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<V> fmt::Debug for Iter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("open", &self.rx.is_some())
            .field("forwarders", &self.forwarders.len())
            .field("stranded", &self.stranded.len())
            .finish()
    }
}
