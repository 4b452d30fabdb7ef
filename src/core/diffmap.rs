use std::hash::Hash;

use hashbrown::HashMap;

/// Equality used to decide whether a new value differs from the committed one.
pub type Comparator<V> = fn(&V, &V) -> bool;

/// Map that tracks committed values and the values set since the last commit.
///
/// Only values that differ from the committed one (per the comparator) are
/// reported by [`DiffMap::commit`].
#[derive(Debug, Clone)]
pub struct DiffMap<K, V> {
    committed: HashMap<K, V>,
    dirty: HashMap<K, V>,
    comparator: Comparator<V>,
}

impl<K, V> DiffMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Empty map using `comparator` as equality.
    pub fn new(comparator: Comparator<V>) -> Self {
        Self {
            committed: HashMap::new(),
            dirty: HashMap::new(),
            comparator,
        }
    }

    /// Records `value` as dirty unless it equals the committed value, in which
    /// case any pending change for `key` is discarded.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(existing) = self.committed.get(&key) {
            if (self.comparator)(existing, &value) {
                self.dirty.remove(&key);
                return;
            }
        }

        self.dirty.insert(key, value);
    }

    /// Folds dirty values into the committed set and returns them.
    pub fn commit(&mut self) -> Vec<V> {
        let mut diff = Vec::with_capacity(self.dirty.len());

        for (key, value) in self.dirty.drain() {
            diff.push(value.clone());
            self.committed.insert(key, value);
        }

        diff
    }

    /// Last committed value for `key`.
    pub fn committed(&self, key: &K) -> Option<&V> {
        self.committed.get(key)
    }

    /// Number of uncommitted changes.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }
}
