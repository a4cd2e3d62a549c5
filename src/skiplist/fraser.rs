//! Fraser lock-free skip list.
//!
//! K. Fraser, "Practical Lock Freedom", PhD dissertation, September 2003.
//!
//! Logical deletion sets the tag bit on every forward pointer of a tower,
//! top-down; the search unlinks marked towers level by level as it
//! descends. A node becomes visible at level 0 first, is linked upward
//! afterwards, and gives up a level silently if it finds itself marked
//! while still linking. The claiming deleter (the thread whose `deleted`
//! counter increment came first) runs one cleanup search after marking and
//! then retires the node; helper unlinks never retire.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::AtomicU32;

use crate::config::{SetConfig, LEVEL_CAP};
use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::ordering::{MARK_ORD, READ_ORD, RELAXED};
use crate::set::ConcurrentSet;
use crate::skiplist::random_level;

struct Node {
    key: Key,
    val: Val,
    deleted: AtomicU32,
    toplevel: usize,
    next: Box<[Atomic<Node>]>,
}

impl Node {
    fn new(key: Key, val: Val, toplevel: usize, level_max: usize) -> Self {
        Self {
            key,
            val,
            deleted: AtomicU32::new(0),
            toplevel,
            next: (0..level_max).map(|_| Atomic::null()).collect(),
        }
    }

    fn new_linked(key: Key, val: Val, next: Shared<'_, Node>, level_max: usize) -> Self {
        let node = Self::new(key, val, level_max, level_max);
        for level in &*node.next {
            level.store(next, RELAXED);
        }
        node
    }
}

/// Lock-free skip list.
pub struct FraserSkipList {
    head: Atomic<Node>,
    level_max: usize,
}

impl FraserSkipList {
    /// Empty skip list; sentinels are full-height towers.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        let level_max = config.level_max.min(LEVEL_CAP).max(1);
        let guard = &epoch::pin();
        let tail = Owned::new(Node::new_linked(KEY_MAX, 0, Shared::null(), level_max))
            .into_shared(guard);
        let head = Owned::new(Node::new_linked(KEY_MIN, 0, tail, level_max));
        Self {
            head: Atomic::from(head),
            level_max,
        }
    }

    /// Mark every forward pointer of `node`, top-down.
    fn mark_tower(node: &Node, guard: &Guard) {
        for i in (0..node.toplevel).rev() {
            loop {
                let next = node.next[i].load(READ_ORD, guard);
                if next.tag() != 0 {
                    break;
                }
                if node.next[i]
                    .compare_exchange(next, next.with_tag(1), MARK_ORD, RELAXED, guard)
                    .is_ok()
                {
                    break;
                }
            }
        }
    }

    /// Per-level boundary search with cleanup: fills `preds`/`succs` so
    /// that on each level `preds[i].key < key <= succs[i].key` and the two
    /// were observed adjacent. Marked towers met on the way are unlinked;
    /// the search restarts when a CAS loses.
    fn search<'g>(
        &self,
        key: Key,
        mut preds: Option<&mut [Shared<'g, Node>]>,
        mut succs: Option<&mut [Shared<'g, Node>]>,
        guard: &'g Guard,
    ) {
        'retry: loop {
            let mut left = self.head.load(READ_ORD, guard);
            let mut left_ref = unsafe { left.deref() };
            for i in (0..self.level_max).rev() {
                let mut left_next = left_ref.next[i].load(READ_ORD, guard);
                if left_next.tag() != 0 {
                    continue 'retry;
                }
                // Find an adjacent unmarked pair at this level.
                let mut right = left_next;
                let mut right_next;
                loop {
                    right_next = unsafe { right.deref() }.next[i].load(READ_ORD, guard);
                    while right_next.tag() != 0 {
                        right = right_next.with_tag(0);
                        right_next = unsafe { right.deref() }.next[i].load(READ_ORD, guard);
                    }
                    if unsafe { right.deref() }.key >= key {
                        break;
                    }
                    left = right;
                    left_ref = unsafe { left.deref() };
                    left_next = right_next;
                    right = right_next;
                }
                if left_next != right
                    && left_ref.next[i]
                        .compare_exchange(left_next, right, MARK_ORD, RELAXED, guard)
                        .is_err()
                {
                    continue 'retry;
                }
                if let Some(preds) = preds.as_deref_mut() {
                    preds[i] = left;
                }
                if let Some(succs) = succs.as_deref_mut() {
                    succs[i] = right;
                }
            }
            return;
        }
    }
}

impl ConcurrentSet for FraserSkipList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut succs = [Shared::null(); LEVEL_CAP];
        self.search(key, None, Some(&mut succs[..self.level_max]), guard);
        let succ = unsafe { succs[0].deref() };
        if succ.key == key && succ.deleted.load(READ_ORD) == 0 {
            Some(succ.val)
        } else {
            None
        }
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let mut preds = [Shared::null(); LEVEL_CAP];
        let mut succs = [Shared::null(); LEVEL_CAP];
        let toplevel = random_level(self.level_max);
        let mut node = Owned::new(Node::new(key, val, toplevel, self.level_max));
        let published = loop {
            self.search(
                key,
                Some(&mut preds[..self.level_max]),
                Some(&mut succs[..self.level_max]),
                guard,
            );
            let succ0 = unsafe { succs[0].deref() };
            if succ0.key == key {
                if succ0.deleted.load(READ_ORD) != 0 {
                    // A logically deleted tower shadows the key; finish its
                    // removal and retry.
                    Self::mark_tower(succ0, guard);
                    continue;
                }
                return false;
            }
            for i in 0..toplevel {
                node.next[i].store(succs[i], RELAXED);
            }
            // Visible once linked at the lowest level.
            match unsafe { preds[0].deref() }.next[0].compare_exchange(
                succs[0],
                node,
                MARK_ORD,
                RELAXED,
                guard,
            ) {
                Ok(shared) => break shared,
                Err(e) => node = e.new,
            }
        };
        let node_ref = unsafe { published.deref() };
        for i in 1..toplevel {
            loop {
                let pred = preds[i];
                let mut succ = succs[i];
                // Refresh our forward pointer if it went stale; give up the
                // level entirely once the tower is marked.
                let new_next = node_ref.next[i].load(READ_ORD, guard);
                if new_next.tag() != 0 {
                    return true;
                }
                if new_next != succ
                    && node_ref.next[i]
                        .compare_exchange(new_next.with_tag(0), succ, MARK_ORD, RELAXED, guard)
                        .is_err()
                {
                    break;
                }
                // An old tower for the same key may still be unlinking.
                if unsafe { succ.deref() }.key == key {
                    succ = unsafe { succ.deref() }.next[0].load(READ_ORD, guard).with_tag(0);
                }
                if unsafe { pred.deref() }.next[i]
                    .compare_exchange(succ, published, MARK_ORD, RELAXED, guard)
                    .is_ok()
                {
                    break;
                }
                self.search(
                    key,
                    Some(&mut preds[..self.level_max]),
                    Some(&mut succs[..self.level_max]),
                    guard,
                );
            }
        }
        true
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut succs = [Shared::null(); LEVEL_CAP];
        self.search(key, None, Some(&mut succs[..self.level_max]), guard);
        let succ0 = unsafe { succs[0].deref() };
        if succ0.key != key {
            return None;
        }
        if succ0.deleted.load(READ_ORD) != 0 {
            return None;
        }
        if succ0.deleted.fetch_add(1, MARK_ORD) == 0 {
            // We claimed the tower: mark it, let a search unlink it
            // everywhere, then hand it to the collector.
            Self::mark_tower(succ0, guard);
            let result = succ0.val;
            self.search(key, None, None, guard);
            unsafe { guard.defer_destroy(succs[0]) };
            return Some(result);
        }
        None
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = head.next[0].load(READ_ORD, guard).with_tag(0);
        let mut size = 0;
        loop {
            let node_ref = unsafe { node.deref() };
            let next = node_ref.next[0].load(READ_ORD, guard);
            if next.with_tag(0).is_null() {
                return size;
            }
            if next.tag() == 0 {
                size += 1;
            }
            node = next.with_tag(0);
        }
    }
}

impl Drop for FraserSkipList {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut node = self.head.load(RELAXED, guard);
            while !node.is_null() {
                let next = node.deref().next[0].load(RELAXED, guard).with_tag(0);
                drop(node.into_owned());
                node = next;
            }
        }
    }
}

#[cfg(test)]
impl FraserSkipList {
    /// Keys of live nodes in level-0 order, for invariant checks.
    fn keys_in_order(&self) -> Vec<Key> {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = head.next[0].load(READ_ORD, guard).with_tag(0);
        let mut keys = Vec::new();
        loop {
            let node_ref = unsafe { node.deref() };
            let next = node_ref.next[0].load(READ_ORD, guard);
            if next.with_tag(0).is_null() {
                return keys;
            }
            if next.tag() == 0 {
                keys.push(node_ref.key);
            }
            node = next.with_tag(0);
        }
    }

    /// Every level-i node must appear at level i-1 as well.
    fn towers_are_nested(&self) -> bool {
        let guard = &epoch::pin();
        for i in 1..self.level_max {
            let head = unsafe { self.head.load(READ_ORD, guard).deref() };
            let mut upper = head.next[i].load(READ_ORD, guard).with_tag(0);
            let mut lower = head.next[i - 1].load(READ_ORD, guard).with_tag(0);
            loop {
                let upper_ref = unsafe { upper.deref() };
                if upper_ref.next[i].load(READ_ORD, guard).with_tag(0).is_null() {
                    break;
                }
                // Advance the lower chain until it meets the upper node.
                loop {
                    let lower_ref = unsafe { lower.deref() };
                    if std::ptr::eq(lower_ref, upper_ref) {
                        break;
                    }
                    if lower_ref.next[i - 1].load(READ_ORD, guard).with_tag(0).is_null() {
                        return false;
                    }
                    lower = lower_ref.next[i - 1].load(READ_ORD, guard).with_tag(0);
                }
                upper = upper_ref.next[i].load(READ_ORD, guard).with_tag(0);
            }
        }
        true
    }
}
