//! Sequential skip list.
//!
//! The no-synchronization baseline: no locks, no validation, no helping.
//! Pointer fields stay atomic so the type can sit behind the common trait,
//! but every access is relaxed and nothing defends against concurrent
//! mutation. Results are only meaningful when driven by a single thread.

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};

use crate::config::{SetConfig, LEVEL_CAP, LEVEL_CAP_SMALL};
use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::ordering::RELAXED;
use crate::set::ConcurrentSet;
use crate::skiplist::random_level;

struct Node {
    key: Key,
    val: Val,
    toplevel: usize,
    next: Box<[Atomic<Node>]>,
}

impl Node {
    fn new(key: Key, val: Val, toplevel: usize, level_max: usize) -> Self {
        Self {
            key,
            val,
            toplevel,
            next: (0..level_max).map(|_| Atomic::null()).collect(),
        }
    }
}

/// Unsynchronized skip list baseline.
pub struct SeqSkipList {
    head: Atomic<Node>,
    level_max: usize,
}

impl SeqSkipList {
    /// Empty skip list.
    ///
    /// # Panics
    /// Panics if `config.level_max` exceeds the structure's level cap.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        assert!(
            config.level_max <= LEVEL_CAP_SMALL,
            "level_max {} is above the supported maximum {}",
            config.level_max,
            LEVEL_CAP_SMALL
        );
        let level_max = config.level_max.max(1);
        let guard = &epoch::pin();
        let tail = Owned::new(Node::new(KEY_MAX, 0, level_max, level_max)).into_shared(guard);
        let head = Owned::new(Node::new(KEY_MIN, 0, level_max, level_max));
        for level in &*head.next {
            level.store(tail, RELAXED);
        }
        Self {
            head: Atomic::from(head),
            level_max,
        }
    }
}

impl ConcurrentSet for SeqSkipList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut node = unsafe { self.head.load(RELAXED, guard).deref() };
        for level in (0..self.level_max).rev() {
            let mut next = unsafe { node.next[level].load(RELAXED, guard).deref() };
            while next.key < key {
                node = next;
                next = unsafe { node.next[level].load(RELAXED, guard).deref() };
            }
        }
        let node = unsafe { node.next[0].load(RELAXED, guard).deref() };
        if node.key == key {
            Some(node.val)
        } else {
            None
        }
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let mut preds: [Shared<'_, Node>; LEVEL_CAP] = [Shared::null(); LEVEL_CAP];
        let mut succs: [Shared<'_, Node>; LEVEL_CAP] = [Shared::null(); LEVEL_CAP];
        let mut node = unsafe { self.head.load(RELAXED, guard).deref() };
        for level in (0..self.level_max).rev() {
            let mut next = unsafe { node.next[level].load(RELAXED, guard).deref() };
            while next.key < key {
                node = next;
                next = unsafe { node.next[level].load(RELAXED, guard).deref() };
            }
            preds[level] = Shared::from(node as *const Node);
            succs[level] = node.next[level].load(RELAXED, guard);
        }
        if unsafe { node.next[0].load(RELAXED, guard).deref() }.key == key {
            return false;
        }

        let toplevel = random_level(self.level_max);
        let new_node = Owned::new(Node::new(key, val, toplevel, self.level_max));
        for level in 0..toplevel {
            new_node.next[level].store(succs[level], RELAXED);
        }
        let new_node = new_node.into_shared(guard);
        for level in 0..toplevel {
            unsafe { preds[level].deref() }.next[level].store(new_node, RELAXED);
        }
        true
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut preds: [Shared<'_, Node>; LEVEL_CAP] = [Shared::null(); LEVEL_CAP];
        let mut succs: [Shared<'_, Node>; LEVEL_CAP] = [Shared::null(); LEVEL_CAP];
        let mut node = unsafe { self.head.load(RELAXED, guard).deref() };
        for level in (0..self.level_max).rev() {
            let mut next = unsafe { node.next[level].load(RELAXED, guard).deref() };
            while next.key < key {
                node = next;
                next = unsafe { node.next[level].load(RELAXED, guard).deref() };
            }
            preds[level] = Shared::from(node as *const Node);
            succs[level] = node.next[level].load(RELAXED, guard);
        }

        let victim = succs[0];
        let victim_ref = unsafe { victim.deref() };
        if victim_ref.key != key {
            return None;
        }
        for level in 0..self.level_max {
            let succ = unsafe { succs[level].deref() };
            if succ.key == key {
                unsafe { preds[level].deref() }.next[level]
                    .store(succ.next[level].load(RELAXED, guard), RELAXED);
            }
        }
        let val = victim_ref.val;
        unsafe { guard.defer_destroy(victim) };
        Some(val)
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(RELAXED, guard).deref() };
        let mut node = unsafe { head.next[0].load(RELAXED, guard).deref() };
        let mut size = 0;
        loop {
            let next = node.next[0].load(RELAXED, guard);
            if next.is_null() {
                return size;
            }
            size += 1;
            node = unsafe { next.deref() };
        }
    }
}

impl Drop for SeqSkipList {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut node = self.head.load(RELAXED, guard);
            while !node.is_null() {
                let next = node.deref().next[0].load(RELAXED, guard);
                drop(node.into_owned());
                node = next;
            }
        }
    }
}
