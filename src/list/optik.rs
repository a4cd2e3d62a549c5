//! Sorted list with version-validated commits.
//!
//! Structurally the lazy list, but the walk records the version of the node
//! it stands on instead of planning to re-validate: the commit-time
//! `try_lock_version` CAS proves the snapshot is still current and takes the
//! lock in one step. A delete locks both predecessor and victim; when the
//! victim lock fails the predecessor is *reverted*, not unlocked, so readers
//! whose snapshots are still good are not invalidated for nothing.

use crossbeam_epoch::{self as epoch, Atomic, Owned};

use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::optik::OptikLock;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
    lock: OptikLock,
}

impl Node {
    fn new(key: Key, val: Val, next: Atomic<Node>) -> Self {
        Self {
            key,
            val,
            next,
            lock: OptikLock::new(),
        }
    }
}

/// Sorted linked list with one versioned lock per node.
pub struct OptikList {
    head: Atomic<Node>,
}

impl Default for OptikList {
    fn default() -> Self {
        Self::new()
    }
}

impl OptikList {
    /// Empty list holding only the two sentinels.
    #[must_use]
    pub fn new() -> Self {
        let tail = Owned::new(Node::new(KEY_MAX, 0, Atomic::null()));
        let head = Owned::new(Node::new(KEY_MIN, 0, Atomic::from(tail)));
        Self {
            head: Atomic::from(head),
        }
    }
}

impl ConcurrentSet for OptikList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut curr = unsafe { self.head.load(READ_ORD, guard).deref() };
        while curr.key < key {
            curr = unsafe { curr.next.load(READ_ORD, guard).deref() };
        }
        if curr.key == key {
            Some(curr.val)
        } else {
            None
        }
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        loop {
            // The version of a node is read before its next pointer, so a
            // successful try_lock_version certifies the pointer we walked.
            let mut curr = unsafe { self.head.load(READ_ORD, guard).deref() };
            let (pred, pred_ver) = loop {
                let curr_ver = curr.lock.load();
                let pred = curr;
                curr = unsafe { curr.next.load(READ_ORD, guard).deref() };
                if curr.key >= key {
                    break (pred, curr_ver);
                }
            };
            if curr.key == key {
                return false;
            }
            if !pred.lock.try_lock_version(pred_ver) {
                continue;
            }
            let node = Owned::new(Node::new(key, val, Atomic::null()));
            node.next
                .store(pred.next.load(READ_ORD, guard), RELAXED);
            pred.next.store(node, WRITE_ORD);
            pred.lock.unlock();
            return true;
        }
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        loop {
            let mut curr_shared = self.head.load(READ_ORD, guard);
            let mut curr = unsafe { curr_shared.deref() };
            let mut curr_ver = curr.lock.load();
            let (pred, pred_ver) = loop {
                let pred = curr;
                let pred_ver = curr_ver;
                curr_shared = curr.next.load(READ_ORD, guard);
                curr = unsafe { curr_shared.deref() };
                curr_ver = curr.lock.load();
                if curr.key >= key {
                    break (pred, pred_ver);
                }
            };
            if curr.key != key {
                return None;
            }
            let next = curr.next.load(READ_ORD, guard);
            if !pred.lock.try_lock_version(pred_ver) {
                continue;
            }
            if !curr.lock.try_lock_version(curr_ver) {
                // Nothing was published under the pred lock; release it
                // without bumping the version.
                pred.lock.revert();
                continue;
            }
            let val = curr.val;
            pred.next.store(next, WRITE_ORD);
            pred.lock.unlock();
            // curr stays locked forever; its version can never validate
            // again, which is exactly the logically-deleted state.
            unsafe { guard.defer_destroy(curr_shared) };
            return Some(val);
        }
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

impl Drop for OptikList {
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
