//! Copy-on-write array-bucket hash table.
//!
//! Each bucket holds an immutable array of entries behind an atomic
//! pointer. Writers take the bucket lock, build a replacement array one
//! entry larger or smaller, publish it with a pointer swap, and retire the
//! old array. Readers scan whatever array they loaded.

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::config::SetConfig;
use crate::key::{Key, Val};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;

/// Fail inserts of present keys and deletes of absent keys before locking.
const RO_FAIL: bool = true;

struct ArrayBucket {
    entries: Box<[(Key, Val)]>,
}

impl ArrayBucket {
    fn empty() -> Self {
        Self {
            entries: Box::new([]),
        }
    }

    fn contains(&self, key: Key) -> bool {
        self.entries.iter().any(|&(k, _)| k == key)
    }
}

/// Hash table with one immutable entry array per bucket.
pub struct CowHashTable {
    mask: u64,
    locks: Box<[CachePadded<Mutex<()>>]>,
    arrays: Box<[Atomic<ArrayBucket>]>,
}

impl CowHashTable {
    /// Table with `config.buckets` buckets.
    ///
    /// # Panics
    /// Panics unless the bucket count is a power of two.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        let buckets = config.buckets;
        assert!(
            buckets.is_power_of_two(),
            "bucket count must be a power of two"
        );
        Self {
            mask: buckets as u64 - 1,
            locks: (0..buckets)
                .map(|_| CachePadded::new(Mutex::new(())))
                .collect(),
            arrays: (0..buckets)
                .map(|_| Atomic::new(ArrayBucket::empty()))
                .collect(),
        }
    }

    fn bucket(&self, key: Key) -> usize {
        ((key as u64) & self.mask) as usize
    }
}

impl ConcurrentSet for CowHashTable {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let array = unsafe { self.arrays[self.bucket(key)].load(READ_ORD, guard).deref() };
        array
            .entries
            .iter()
            .find(|&&(k, _)| k == key)
            .map(|&(_, v)| v)
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let bucket = self.bucket(key);

        if RO_FAIL {
            let array = unsafe { self.arrays[bucket].load(READ_ORD, guard).deref() };
            if array.contains(key) {
                return false;
            }
        }

        let _locked = self.locks[bucket].lock();
        let old_shared = self.arrays[bucket].load(READ_ORD, guard);
        let old = unsafe { old_shared.deref() };
        if old.contains(key) {
            return false;
        }
        let mut entries = Vec::with_capacity(old.entries.len() + 1);
        entries.extend_from_slice(&old.entries);
        entries.push((key, val));
        self.arrays[bucket].store(
            Owned::new(ArrayBucket {
                entries: entries.into_boxed_slice(),
            }),
            WRITE_ORD,
        );
        unsafe { guard.defer_destroy(old_shared) };
        true
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let bucket = self.bucket(key);

        if RO_FAIL {
            let array = unsafe { self.arrays[bucket].load(READ_ORD, guard).deref() };
            if !array.contains(key) {
                return None;
            }
        }

        let _locked = self.locks[bucket].lock();
        let old_shared = self.arrays[bucket].load(READ_ORD, guard);
        let old = unsafe { old_shared.deref() };
        let mut result = None;
        let mut entries = Vec::with_capacity(old.entries.len().saturating_sub(1));
        for &(k, v) in &*old.entries {
            if k == key {
                result = Some(v);
            } else {
                entries.push((k, v));
            }
        }
        if result.is_some() {
            self.arrays[bucket].store(
                Owned::new(ArrayBucket {
                    entries: entries.into_boxed_slice(),
                }),
                WRITE_ORD,
            );
            unsafe { guard.defer_destroy(old_shared) };
        }
        result
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        self.arrays
            .iter()
            .map(|array| unsafe { array.load(READ_ORD, guard).deref() }.entries.len())
            .sum()
    }
}

impl Drop for CowHashTable {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            for array in &*self.arrays {
                drop(array.load(RELAXED, guard).into_owned());
            }
        }
    }
}
