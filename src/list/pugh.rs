//! Pugh-style sorted list with per-node spinlocks.
//!
//! W. Pugh, "Concurrent Maintenance of Skip Lists", technical report, 1990
//! (the single-level special case).
//!
//! Two search variants: *weak* (no locks, used by `find` and to pick a
//! starting point) and *strong* (locks the predecessor and re-advances
//! under lock until `pred.next.key >= key`). A node carries a `deleted`
//! flag set under its lock; the strong search re-checks the flag after each
//! acquisition and restarts from the head if it locked a node that was
//! unlinked during the hand-over, so updates are never committed behind a
//! removed predecessor.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::AtomicBool;

use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;
use crate::ttas::Spinlock;

/// Fail inserts of present keys and deletes of absent keys before locking.
const RO_FAIL: bool = true;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
    deleted: AtomicBool,
    lock: Spinlock,
}

impl Node {
    fn new(key: Key, val: Val, next: Atomic<Node>) -> Self {
        Self {
            key,
            val,
            next,
            deleted: AtomicBool::new(false),
            lock: Spinlock::new(),
        }
    }
}

/// Sorted list with weak/strong searches and per-node spinlocks.
pub struct PughList {
    head: Atomic<Node>,
}

impl Default for PughList {
    fn default() -> Self {
        Self::new()
    }
}

impl PughList {
    /// Empty list holding only the two sentinels.
    #[must_use]
    pub fn new() -> Self {
        let tail = Owned::new(Node::new(KEY_MAX, 0, Atomic::null()));
        let head = Owned::new(Node::new(KEY_MIN, 0, Atomic::from(tail)));
        Self {
            head: Atomic::from(head),
        }
    }

    /// Last node with `node.key < key`, no locks taken.
    fn search_weak_left<'g>(&self, key: Key, guard: &'g Guard) -> &'g Node {
        let mut pred = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut succ = unsafe { pred.next.load(READ_ORD, guard).deref() };
        while succ.key < key {
            pred = succ;
            succ = unsafe { succ.next.load(READ_ORD, guard).deref() };
        }
        pred
    }

    /// First node with `node.key >= key`, no locks taken.
    fn search_weak_right<'g>(&self, key: Key, guard: &'g Guard) -> &'g Node {
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut succ = unsafe { head.next.load(READ_ORD, guard).deref() };
        while succ.key < key {
            succ = unsafe { succ.next.load(READ_ORD, guard).deref() };
        }
        succ
    }

    /// Lock the live predecessor of `key`. On return `pred` is locked, not
    /// deleted, and `succ == pred.next` with `succ.key >= key`.
    fn search_strong<'g>(&self, key: Key, guard: &'g Guard) -> (&'g Node, Shared<'g, Node>) {
        'restart: loop {
            let mut pred = self.search_weak_left(key, guard);
            pred.lock.lock();
            if pred.deleted.load(READ_ORD) {
                pred.lock.unlock();
                continue 'restart;
            }
            let mut succ = pred.next.load(READ_ORD, guard);
            while unsafe { succ.deref() }.key < key {
                pred.lock.unlock();
                pred = unsafe { succ.deref() };
                pred.lock.lock();
                if pred.deleted.load(READ_ORD) {
                    pred.lock.unlock();
                    continue 'restart;
                }
                succ = pred.next.load(READ_ORD, guard);
            }
            return (pred, succ);
        }
    }

    /// Strong search that bails without locking when the weak pre-check
    /// already decides the operation (`equal` = outcome that fails).
    fn search_strong_cond<'g>(
        &self,
        key: Key,
        equal: bool,
        guard: &'g Guard,
    ) -> Option<(&'g Node, Shared<'g, Node>)> {
        let pred = self.search_weak_left(key, guard);
        let succ = unsafe { pred.next.load(READ_ORD, guard).deref() };
        if (succ.key == key) == equal {
            return None;
        }
        Some(self.search_strong(key, guard))
    }
}

impl ConcurrentSet for PughList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let right = self.search_weak_right(key, guard);
        if right.key == key {
            Some(right.val)
        } else {
            None
        }
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let (left, right) = if RO_FAIL {
            match self.search_strong_cond(key, true, guard) {
                Some(pair) => pair,
                None => return false,
            }
        } else {
            self.search_strong(key, guard)
        };
        let mut result = true;
        if unsafe { right.deref() }.key == key {
            result = false;
        } else {
            let node = Owned::new(Node::new(key, val, Atomic::null()));
            node.next.store(right, RELAXED);
            left.next.store(node, WRITE_ORD);
        }
        left.lock.unlock();
        result
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let (left, right) = if RO_FAIL {
            match self.search_strong_cond(key, false, guard) {
                Some(pair) => pair,
                None => return None,
            }
        } else {
            self.search_strong(key, guard)
        };
        let mut result = None;
        let right_ref = unsafe { right.deref() };
        if right_ref.key == key {
            right_ref.lock.lock();
            result = Some(right_ref.val);
            right_ref.deleted.store(true, WRITE_ORD);
            left.next
                .store(right_ref.next.load(READ_ORD, guard), WRITE_ORD);
            right_ref.lock.unlock();
            unsafe { guard.defer_destroy(right) };
        }
        left.lock.unlock();
        result
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = unsafe { head.next.load(READ_ORD, guard).deref() };
        let mut size = 0;
        loop {
            let next = node.next.load(READ_ORD, guard);
            if next.is_null() {
                return size;
            }
            size += 1;
            node = unsafe { next.deref() };
        }
    }
}

impl Drop for PughList {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut node = self.head.load(RELAXED, guard);
            while !node.is_null() {
                let next = node.deref().next.load(RELAXED, guard);
                drop(node.into_owned());
                node = next;
            }
        }
    }
}
