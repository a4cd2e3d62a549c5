//! Lazy concurrent list-based set.
//!
//! S. Heller, M. Herlihy, V. Luchangco, M. Moir, W. N. Scherer III,
//! N. Shavit, "A Lazy Concurrent List-Based Set Algorithm", OPODIS 2005.
//!
//! Writers walk without locks, then lock `pred` (and `curr` for delete) and
//! validate `!pred.marked && !curr.marked && pred.next == curr` before
//! mutating. Deletion marks before unlinking, so the wait-free `find` can
//! trust a node's `marked` flag.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;

use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;

/// Fail inserts of present keys and deletes of absent keys before locking.
const RO_FAIL: bool = true;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
    marked: AtomicBool,
    lock: Mutex<()>,
}

impl Node {
    fn new(key: Key, val: Val, next: Atomic<Node>) -> Self {
        Self {
            key,
            val,
            next,
            marked: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }
}

/// Lazy list with per-node locks and wait-free finds.
pub struct LazyList {
    head: Atomic<Node>,
}

impl Default for LazyList {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(pred: &Node, curr: Shared<'_, Node>, guard: &Guard) -> bool {
    let curr_ref = unsafe { curr.deref() };
    !pred.marked.load(READ_ORD)
        && !curr_ref.marked.load(READ_ORD)
        && pred.next.load(READ_ORD, guard) == curr
}

impl LazyList {
    /// Empty list holding only the two sentinels.
    #[must_use]
    pub fn new() -> Self {
        let tail = Owned::new(Node::new(KEY_MAX, 0, Atomic::null()));
        let head = Owned::new(Node::new(KEY_MIN, 0, Atomic::from(tail)));
        Self {
            head: Atomic::from(head),
        }
    }

    /// Walk to the first node with `key <= node.key`, returning the node
    /// before it as well.
    fn walk<'g>(&self, key: Key, guard: &'g Guard) -> (Shared<'g, Node>, Shared<'g, Node>) {
        let mut pred = self.head.load(READ_ORD, guard);
        let mut curr = unsafe { pred.deref() }.next.load(READ_ORD, guard);
        while unsafe { curr.deref() }.key < key {
            pred = curr;
            curr = unsafe { curr.deref() }.next.load(READ_ORD, guard);
        }
        (pred, curr)
    }
}

impl ConcurrentSet for LazyList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut curr = self.head.load(READ_ORD, guard);
        let mut curr_ref = unsafe { curr.deref() };
        while curr_ref.key < key {
            curr = curr_ref.next.load(READ_ORD, guard);
            curr_ref = unsafe { curr.deref() };
        }
        if curr_ref.key == key && !curr_ref.marked.load(READ_ORD) {
            Some(curr_ref.val)
        } else {
            None
        }
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        loop {
            let (pred, curr) = self.walk(key, guard);
            let pred_ref = unsafe { pred.deref() };
            let curr_ref = unsafe { curr.deref() };
            if RO_FAIL && curr_ref.key == key {
                if curr_ref.marked.load(READ_ORD) {
                    // Logically deleted; wait for the unlink and retry.
                    continue;
                }
                return false;
            }
            let locked = pred_ref.lock.lock();
            if validate(pred_ref, curr, guard) {
                if curr_ref.key == key {
                    return false;
                }
                let node = Owned::new(Node::new(key, val, Atomic::null()));
                node.next.store(curr, RELAXED);
                pred_ref.next.store(node, WRITE_ORD);
                return true;
            }
            drop(locked);
        }
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        loop {
            let (pred, curr) = self.walk(key, guard);
            let pred_ref = unsafe { pred.deref() };
            let curr_ref = unsafe { curr.deref() };
            if RO_FAIL && curr_ref.key != key {
                return None;
            }
            let pred_locked = pred_ref.lock.lock();
            let curr_locked = curr_ref.lock.lock();
            if validate(pred_ref, curr, guard) {
                if curr_ref.key != key {
                    return None;
                }
                let val = curr_ref.val;
                let next = curr_ref.next.load(READ_ORD, guard);
                curr_ref.marked.store(true, WRITE_ORD);
                pred_ref.next.store(next, WRITE_ORD);
                drop(curr_locked);
                drop(pred_locked);
                unsafe { guard.defer_destroy(curr) };
                return Some(val);
            }
            drop(curr_locked);
            drop(pred_locked);
        }
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = head.next.load(READ_ORD, guard);
        let mut size = 0;
        loop {
            let node_ref = unsafe { node.deref() };
            let next = node_ref.next.load(READ_ORD, guard);
            if next.is_null() {
                return size;
            }
            size += 1;
            node = next;
        }
    }
}

impl Drop for LazyList {
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
