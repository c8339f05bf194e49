//! Lock-striped hash map
//!
//! Keys are spread over a fixed number of independently locked shards so
//! operations on unrelated keys do not wait on each other. No method ever
//! holds two shard locks at once.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

use parking_lot::Mutex;

pub(crate) const DEFAULT_STRIPES: usize = 16;

pub(crate) struct Striped<K, V> {
    hasher: RandomState,
    stripes: Box<[Mutex<HashMap<K, V>>]>,
}

impl<K: Hash + Eq, V> Striped<K, V> {
    pub(crate) fn new(stripes: usize) -> Self {
        Self {
            hasher: RandomState::new(),
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    /// Run `f` with exclusive access to the shard that owns `key`
    pub(crate) fn with<R>(&self, key: &K, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let idx = (self.hasher.hash_one(key) as usize) % self.stripes.len();
        let mut shard = self.stripes[idx].lock();
        f(&mut shard)
    }

    /// Visit every shard in turn
    pub(crate) fn for_each_shard(&self, mut f: impl FnMut(&mut HashMap<K, V>)) {
        for stripe in self.stripes.iter() {
            f(&mut stripe.lock());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.stripes.iter().map(|s| s.lock().len()).sum()
    }
}

impl<K: Hash + Eq, V> Default for Striped<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
