//! Segmented hash table with per-segment rehash.
//!
//! Modeled on Doug Lea's `ConcurrentHashMap` (the pre-JDK5 design): a fixed
//! array of segments, each a small chained hash table behind its own lock.
//! When an insert would push a segment past its size limit, the inserting
//! thread rebuilds the segment with twice the buckets *while holding the
//! old segment's lock*, publishes the new segment with a pointer swap, and
//! never unlocks the old one; spinning writers re-read the segment pointer
//! on every acquisition attempt, so they migrate to the replacement.
//! Readers work on whatever segment snapshot they loaded.
//!
//! The rehash reuses the longest suffix of each chain that lands in one new
//! bucket (the consecutive-run trick) and clones only the prefix; cloned
//! originals and the replaced segment are retired to the epoch.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::AtomicU32;

use crate::config::SetConfig;
use crate::key::{Key, Val};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;
use crate::tracing_helpers::debug_log;
use crate::ttas::Spinlock;

/// Fail inserts of present keys and deletes of absent keys before locking.
const RO_FAIL: bool = true;

/// Per-segment load factor; the CLI-level load factor scales the initial
/// capacity instead.
const SEG_LOAD_FACTOR: u32 = 1;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
}

struct Segment {
    num_buckets: usize,
    mask: u64,
    lock: Spinlock,
    size: AtomicU32,
    size_limit: u32,
    table: Box<[Atomic<Node>]>,
}

impl Segment {
    fn new(num_buckets: usize) -> Self {
        debug_assert!(num_buckets.is_power_of_two());
        Self {
            num_buckets,
            mask: num_buckets as u64 - 1,
            lock: Spinlock::new(),
            size: AtomicU32::new(0),
            size_limit: (SEG_LOAD_FACTOR * num_buckets as u32).max(1),
            table: (0..num_buckets).map(|_| Atomic::null()).collect(),
        }
    }
}

/// Segmented hash table.
pub struct JavaHashTable {
    num_segments: usize,
    seg_mask: u64,
    hash_shift: u32,
    segments: Box<[Atomic<Segment>]>,
}

impl JavaHashTable {
    /// Table with `config.concurrency` segments sharing
    /// `config.capacity` buckets.
    ///
    /// # Panics
    /// Panics unless the segment count is a power of two.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        let num_segments = config.concurrency;
        assert!(
            num_segments.is_power_of_two(),
            "segment count must be a power of two"
        );
        let capacity = config.capacity.max(num_segments);
        // The bucket mask needs a power of two; round the per-segment share
        // up when the load factor made it ragged.
        let capacity_seg = (capacity / num_segments).max(1).next_power_of_two();
        Self {
            num_segments,
            seg_mask: num_segments as u64 - 1,
            hash_shift: num_segments.trailing_zeros(),
            segments: (0..num_segments)
                .map(|_| Atomic::new(Segment::new(capacity_seg)))
                .collect(),
        }
    }

    /// Bucket hash: the segment-selector bits are shifted out first.
    fn hash(&self, key: Key) -> u64 {
        (key as u64) >> self.hash_shift
    }

    fn segment_index(&self, key: Key) -> usize {
        ((key as u64) & self.seg_mask) as usize
    }

    fn contains(&self, seg: &Segment, key: Key, guard: &Guard) -> bool {
        let bucket = (self.hash(key) & seg.mask) as usize;
        let mut curr = seg.table[bucket].load(READ_ORD, guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            if node.key == key {
                return true;
            }
            curr = node.next.load(READ_ORD, guard);
        }
        false
    }

    /// Load the current segment and take its lock, re-reading the pointer
    /// on every failed attempt: a rehash leaves the replaced segment locked
    /// forever, so spinners must migrate to the published replacement.
    fn lock_segment<'g>(&self, seg_num: usize, guard: &'g Guard) -> Shared<'g, Segment> {
        loop {
            let seg = self.segments[seg_num].load(READ_ORD, guard);
            if unsafe { seg.deref() }.lock.try_lock() {
                return seg;
            }
            std::thread::yield_now();
        }
    }

    /// Rebuild `seg_old` with doubled buckets, fold in `new_node`, publish,
    /// and retire the old segment. Runs with `seg_old`'s lock held; the
    /// lock is never released.
    fn rehash<'g>(
        &self,
        seg_num: usize,
        seg_old_shared: Shared<'g, Segment>,
        new_node: Owned<Node>,
        guard: &'g Guard,
    ) {
        let seg_old = unsafe { seg_old_shared.deref() };
        let seg_new = Segment::new(seg_old.num_buckets << 1);
        let mask_new = seg_new.mask;
        debug_log!(
            segment = seg_num,
            buckets = seg_new.num_buckets,
            "rehashing segment"
        );
        // Cloned-over originals stay readable through the old segment until
        // the swap below publishes the replacement; they are only retired
        // after that, so a reader pinning mid-rehash never walks freed
        // nodes.
        let mut superseded: Vec<Shared<'g, Node>> = Vec::new();

        for b in 0..seg_old.num_buckets {
            let curr = seg_old.table[b].load(READ_ORD, guard);
            let Some(curr_ref) = (unsafe { curr.as_ref() }) else {
                continue;
            };
            let next = curr_ref.next.load(READ_ORD, guard);
            let idx = (self.hash(curr_ref.key) & mask_new) as usize;
            if next.is_null() {
                // Single node: move it.
                seg_new.table[idx].store(curr, RELAXED);
            } else {
                // Reuse the longest suffix landing in a single new bucket.
                let mut last_run = curr;
                let mut last_idx = idx;
                let mut last = next;
                while let Some(last_ref) = unsafe { last.as_ref() } {
                    let k = (self.hash(last_ref.key) & mask_new) as usize;
                    if k != last_idx {
                        last_idx = k;
                        last_run = last;
                    }
                    last = last_ref.next.load(READ_ORD, guard);
                }
                seg_new.table[last_idx].store(last_run, RELAXED);
                // Clone the prefix; the originals stay readable in the old
                // segment until the epoch turns.
                let mut p = curr;
                while p != last_run {
                    let p_ref = unsafe { p.deref() };
                    let k = (self.hash(p_ref.key) & mask_new) as usize;
                    let clone = Owned::new(Node {
                        key: p_ref.key,
                        val: p_ref.val,
                        next: Atomic::from(seg_new.table[k].load(RELAXED, guard)),
                    });
                    seg_new.table[k].store(clone, RELAXED);
                    superseded.push(p);
                    p = p_ref.next.load(READ_ORD, guard);
                }
            }
        }

        let new_idx = (self.hash(new_node.key) & mask_new) as usize;
        new_node
            .next
            .store(seg_new.table[new_idx].load(RELAXED, guard), RELAXED);
        seg_new.table[new_idx].store(new_node, RELAXED);
        seg_new
            .size
            .store(seg_old.size.load(RELAXED) + 1, RELAXED);

        self.segments[seg_num].store(Owned::new(seg_new), WRITE_ORD);
        for node in superseded {
            unsafe { guard.defer_destroy(node) };
        }
        unsafe { guard.defer_destroy(seg_old_shared) };
    }
}

impl ConcurrentSet for JavaHashTable {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let seg = unsafe {
            self.segments[self.segment_index(key)]
                .load(READ_ORD, guard)
                .deref()
        };
        let bucket = (self.hash(key) & seg.mask) as usize;
        let mut curr = seg.table[bucket].load(READ_ORD, guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            if node.key == key {
                return Some(node.val);
            }
            curr = node.next.load(READ_ORD, guard);
        }
        None
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let seg_num = self.segment_index(key);

        if RO_FAIL {
            let seg = unsafe { self.segments[seg_num].load(READ_ORD, guard).deref() };
            if self.contains(seg, key, guard) {
                return false;
            }
        }

        let seg_shared = self.lock_segment(seg_num, guard);
        let seg = unsafe { seg_shared.deref() };

        let bucket = (self.hash(key) & seg.mask) as usize;
        let mut pred: Shared<'_, Node> = Shared::null();
        let mut curr = seg.table[bucket].load(READ_ORD, guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            if node.key == key {
                seg.lock.unlock();
                return false;
            }
            pred = curr;
            curr = node.next.load(READ_ORD, guard);
        }

        let node = Owned::new(Node {
            key,
            val,
            next: Atomic::null(),
        });
        let sizepp = seg.size.load(RELAXED) + 1;
        if sizepp >= seg.size_limit {
            self.rehash(seg_num, seg_shared, node, guard);
        } else {
            match unsafe { pred.as_ref() } {
                Some(pred) => pred.next.store(node, WRITE_ORD),
                None => seg.table[bucket].store(node, WRITE_ORD),
            }
            seg.size.store(sizepp, RELAXED);
            seg.lock.unlock();
        }
        true
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let seg_num = self.segment_index(key);

        if RO_FAIL {
            let seg = unsafe { self.segments[seg_num].load(READ_ORD, guard).deref() };
            if !self.contains(seg, key, guard) {
                return None;
            }
        }

        let seg_shared = self.lock_segment(seg_num, guard);
        let seg = unsafe { seg_shared.deref() };

        let bucket = (self.hash(key) & seg.mask) as usize;
        let mut pred: Shared<'_, Node> = Shared::null();
        let mut curr = seg.table[bucket].load(READ_ORD, guard);
        while let Some(node) = unsafe { curr.as_ref() } {
            if node.key == key {
                let next = node.next.load(READ_ORD, guard);
                match unsafe { pred.as_ref() } {
                    Some(pred) => pred.next.store(next, WRITE_ORD),
                    None => seg.table[bucket].store(next, WRITE_ORD),
                }
                seg.size.store(seg.size.load(RELAXED) - 1, RELAXED);
                seg.lock.unlock();
                unsafe { guard.defer_destroy(curr) };
                return Some(node.val);
            }
            pred = curr;
            curr = node.next.load(READ_ORD, guard);
        }
        seg.lock.unlock();
        None
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let mut size = 0;
        for s in 0..self.num_segments {
            let seg = unsafe { self.segments[s].load(READ_ORD, guard).deref() };
            for bucket in &*seg.table {
                let mut curr = bucket.load(READ_ORD, guard);
                while let Some(node) = unsafe { curr.as_ref() } {
                    size += 1;
                    curr = node.next.load(READ_ORD, guard);
                }
            }
        }
        size
    }
}

impl Drop for JavaHashTable {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            for s in 0..self.num_segments {
                let seg = self.segments[s].load(RELAXED, guard);
                for bucket in &*seg.deref().table {
                    let mut curr = bucket.load(RELAXED, guard);
                    while !curr.is_null() {
                        let next = curr.deref().next.load(RELAXED, guard);
                        drop(curr.into_owned());
                        curr = next;
                    }
                }
                drop(seg.into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SetConfig {
        SetConfig {
            capacity: 16,
            concurrency: 4,
            ..SetConfig::default()
        }
    }

    #[test]
    fn rehash_preserves_entries() {
        let ht = JavaHashTable::new(&config());
        // Far more keys than the initial capacity: several rehash rounds.
        for key in 0..512 {
            assert!(ht.insert(key, key * 3));
        }
        assert_eq!(ht.size(), 512);
        for key in 0..512 {
            assert_eq!(ht.find(key), Some(key * 3));
        }
    }

    #[test]
    fn delete_across_segments() {
        let ht = JavaHashTable::new(&config());
        for key in 0..128 {
            ht.insert(key, key);
        }
        for key in (0..128).step_by(2) {
            assert_eq!(ht.delete(key), Some(key));
        }
        assert_eq!(ht.size(), 64);
        assert_eq!(ht.find(3), Some(3));
        assert_eq!(ht.find(4), None);
    }

    #[test]
    fn single_segment_degenerates_to_chained_table() {
        let ht = JavaHashTable::new(&SetConfig {
            capacity: 1,
            concurrency: 1,
            ..SetConfig::default()
        });
        assert!(ht.insert(1, 10));
        assert!(ht.insert(2, 20));
        assert!(!ht.insert(1, 99));
        assert_eq!(ht.delete(1), Some(10));
        assert_eq!(ht.find(2), Some(20));
        assert_eq!(ht.size(), 1);
    }
}
