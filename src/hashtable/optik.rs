//! Hash table with one optimistically-validated sorted list per bucket.
//!
//! Each bucket is a sorted singly-linked chain guarded by a single
//! versioned lock. Writers walk the chain against a version snapshot and
//! commit with one validating CAS on the bucket lock; a committed write
//! invalidates every snapshot taken before it, so the walk never needs
//! per-node state.

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;

use crate::config::SetConfig;
use crate::key::{Key, Val};
use crate::optik::OptikLock;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
}

struct Bucket {
    head: Atomic<Node>,
    lock: OptikLock,
}

impl Bucket {
    fn new() -> Self {
        Self {
            head: Atomic::null(),
            lock: OptikLock::new(),
        }
    }
}

/// Hash table with a version-validated list per bucket.
pub struct OptikHashTable {
    mask: u64,
    buckets: Box<[CachePadded<Bucket>]>,
}

impl OptikHashTable {
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
            buckets: (0..buckets)
                .map(|_| CachePadded::new(Bucket::new()))
                .collect(),
        }
    }

    fn bucket(&self, key: Key) -> &Bucket {
        &self.buckets[((key as u64) & self.mask) as usize]
    }
}

impl ConcurrentSet for OptikHashTable {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut curr = self.bucket(key).head.load(READ_ORD, guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            if node.key >= key {
                if node.key == key {
                    return Some(node.val);
                }
                return None;
            }
            curr = node.next.load(READ_ORD, guard);
        }
        None
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let bucket = self.bucket(key);
        loop {
            let bucket_ver = bucket.lock.load();
            let mut pred: Shared<'_, Node> = Shared::null();
            let mut curr = bucket.head.load(READ_ORD, guard);
            while let Some(node) = unsafe { curr.as_ref() } {
                if node.key >= key {
                    break;
                }
                pred = curr;
                curr = node.next.load(READ_ORD, guard);
            }
            if let Some(node) = unsafe { curr.as_ref() } {
                if node.key == key {
                    return false;
                }
            }
            if bucket.lock.try_lock_version(bucket_ver) {
                let node = Owned::new(Node {
                    key,
                    val,
                    next: Atomic::null(),
                });
                node.next.store(curr, RELAXED);
                match unsafe { pred.as_ref() } {
                    Some(pred) => pred.next.store(node, WRITE_ORD),
                    None => bucket.head.store(node, WRITE_ORD),
                }
                bucket.lock.unlock();
                return true;
            }
            std::thread::yield_now();
        }
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let bucket = self.bucket(key);
        loop {
            let bucket_ver = bucket.lock.load();
            let mut pred: Shared<'_, Node> = Shared::null();
            let mut curr = bucket.head.load(READ_ORD, guard);
            while let Some(node) = unsafe { curr.as_ref() } {
                if node.key >= key {
                    break;
                }
                pred = curr;
                curr = node.next.load(READ_ORD, guard);
            }
            let Some(node) = (unsafe { curr.as_ref() }) else {
                return None;
            };
            if node.key != key {
                return None;
            }
            if bucket.lock.try_lock_version(bucket_ver) {
                let next = node.next.load(READ_ORD, guard);
                match unsafe { pred.as_ref() } {
                    Some(pred) => pred.next.store(next, WRITE_ORD),
                    None => bucket.head.store(next, WRITE_ORD),
                }
                bucket.lock.unlock();
                unsafe { guard.defer_destroy(curr) };
                return Some(node.val);
            }
            std::thread::yield_now();
        }
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let mut size = 0;
        for bucket in &*self.buckets {
            let mut curr = bucket.head.load(READ_ORD, guard);
            while let Some(node) = unsafe { curr.as_ref() } {
                size += 1;
                curr = node.next.load(READ_ORD, guard);
            }
        }
        size
    }
}

impl Drop for OptikHashTable {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            for bucket in &*self.buckets {
                let mut curr = bucket.head.load(RELAXED, guard);
                while !curr.is_null() {
                    let next = curr.deref().next.load(RELAXED, guard);
                    drop(curr.into_owned());
                    curr = next;
                }
            }
        }
    }
}
