//! Mutex-per-bucket hash table.
//!
//! The plainest design in the family: each bucket is a native map behind
//! its own mutex. It exists as the baseline the message-passing variant is
//! measured against.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::config::SetConfig;
use crate::key::{Key, Val};
use crate::set::ConcurrentSet;

/// Hash table with one locked map per bucket.
pub struct LockedHashTable {
    buckets: Box<[Mutex<HashMap<Key, Val>>]>,
}

impl LockedHashTable {
    /// Table with `config.buckets` buckets.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        Self {
            buckets: (0..config.buckets.max(1))
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    fn bucket(&self, key: Key) -> &Mutex<HashMap<Key, Val>> {
        &self.buckets[((key as u64) % self.buckets.len() as u64) as usize]
    }
}

impl ConcurrentSet for LockedHashTable {
    fn find(&self, key: Key) -> Option<Val> {
        self.bucket(key).lock().get(&key).copied()
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let mut bucket = self.bucket(key).lock();
        if bucket.contains_key(&key) {
            return false;
        }
        bucket.insert(key, val);
        true
    }

    fn delete(&self, key: Key) -> Option<Val> {
        self.bucket(key).lock().remove(&key)
    }

    fn size(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().len()).sum()
    }
}
