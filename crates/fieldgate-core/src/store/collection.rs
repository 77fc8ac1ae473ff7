// ── Generic reactive entity collection ──
//
// Concurrent storage with O(1) lookups, per-entity atomic
// read-modify-write, and push-based change notification via `watch`.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

/// A concurrent, reactive collection for a single entity type.
///
/// Each entity is an independent unit of mutation: [`update`](Self::update)
/// runs its closure while holding the entity's shard lock, so a conditional
/// transition observes and replaces the value in one step. The snapshot that
/// subscribers receive is only rebuilt while someone is subscribed.
pub(crate) struct EntityCollection<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    by_key: DashMap<K, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot for subscribers.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<K, T> EntityCollection<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entity, returning the stored value.
    pub(crate) fn put(&self, key: K, entity: T) -> Arc<T> {
        let value = Arc::new(entity);
        self.by_key.insert(key, Arc::clone(&value));
        self.publish();
        value
    }

    /// Insert or replace an entity, returning the stored value and the one
    /// it displaced. The swap is atomic, so concurrent writers each see
    /// their true predecessor.
    pub(crate) fn replace(&self, key: K, entity: T) -> (Arc<T>, Option<Arc<T>>) {
        let value = Arc::new(entity);
        let previous = self.by_key.insert(key, Arc::clone(&value));
        self.publish();
        (value, previous)
    }

    /// Create or modify one entity under its entry lock.
    ///
    /// `f` sees the current value (`None` when absent) and returns the value
    /// to store plus a caller-defined result. An error writes nothing.
    pub(crate) fn upsert<R, E>(
        &self,
        key: K,
        f: impl FnOnce(Option<&T>) -> Result<(T, R), E>,
    ) -> Result<(Arc<T>, R), E> {
        let result = match self.by_key.entry(key) {
            Entry::Occupied(mut slot) => f(Some(slot.get())).map(|(next, extra)| {
                let next = Arc::new(next);
                slot.insert(Arc::clone(&next));
                (next, extra)
            }),
            Entry::Vacant(slot) => f(None).map(|(next, extra)| {
                let next = Arc::new(next);
                slot.insert(Arc::clone(&next));
                (next, extra)
            }),
        };
        if result.is_ok() {
            self.publish();
        }
        result
    }

    /// Atomically read-modify-write one entity.
    ///
    /// `f` sees the current value and either returns the replacement plus a
    /// caller-defined result, or an error that leaves the entity untouched.
    /// Returns `None` if the key does not exist.
    pub(crate) fn update<R, E>(
        &self,
        key: &K,
        f: impl FnOnce(&T) -> Result<(T, R), E>,
    ) -> Option<Result<(Arc<T>, R), E>> {
        let result = {
            let mut slot = self.by_key.get_mut(key)?;
            match f(slot.value()) {
                Ok((next, extra)) => {
                    let next = Arc::new(next);
                    *slot.value_mut() = Arc::clone(&next);
                    Ok((next, extra))
                }
                Err(e) => Err(e),
            }
        };
        // The shard guard is released above; publishing iterates all shards.
        if result.is_ok() {
            self.publish();
        }
        Some(result)
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Point-in-time copy of every entity.
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        Arc::new(self.collect())
    }

    /// Entities matching `pred`, cloned out of the map.
    pub(crate) fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<Arc<T>> {
        self.by_key
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        let mut rx = self.snapshot.subscribe();
        self.rebuild_snapshot();
        // The rebuild is the starting point, not a change.
        let _ = rx.borrow_and_update();
        rx
    }

    #[cfg(test)]
    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn collect(&self) -> Vec<Arc<T>> {
        self.by_key.iter().map(|r| Arc::clone(r.value())).collect()
    }

    fn publish(&self) {
        self.version.send_modify(|v| *v += 1);
        if self.snapshot.receiver_count() > 0 {
            self.rebuild_snapshot();
        }
    }

    fn rebuild_snapshot(&self) {
        let values = self.collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
