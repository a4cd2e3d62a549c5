//! Harris lock-free linked list.
//!
//! T. L. Harris, "A Pragmatic Implementation of Non-blocking Linked-Lists",
//! DISC 2001. Optimized variant: the search does not restart on a failed
//! helping CAS, it simply keeps walking the stale chain.
//!
//! A set tag bit on `node.next` means "node is logically deleted". Once the
//! bit is set no insert can succeed through the node (the insert CAS expects
//! an untagged pointer), and one successful helping CAS makes the node
//! unreachable. The thread whose CAS unlinks a node retires it.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};

use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::ordering::{MARK_ORD, READ_ORD, RELAXED};
use crate::set::ConcurrentSet;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
}

impl Node {
    fn new(key: Key, val: Val, next: Atomic<Node>) -> Self {
        Self { key, val, next }
    }
}

/// Lock-free sorted linked list.
pub struct HarrisList {
    head: Atomic<Node>,
}

impl Default for HarrisList {
    fn default() -> Self {
        Self::new()
    }
}

impl HarrisList {
    /// Empty list holding only the two sentinels.
    #[must_use]
    pub fn new() -> Self {
        let tail = Owned::new(Node::new(KEY_MAX, 0, Atomic::null()));
        let head = Owned::new(Node::new(KEY_MIN, 0, Atomic::from(tail)));
        Self {
            head: Atomic::from(head),
        }
    }

    /// CAS `left.next` past `right`, retiring `right` on success.
    fn unlink_right<'g>(
        left: &Node,
        right: Shared<'g, Node>,
        guard: &'g Guard,
    ) -> bool {
        let right_next = unsafe { right.deref() }.next.load(READ_ORD, guard);
        let ok = left
            .next
            .compare_exchange(right, right_next.with_tag(0), MARK_ORD, RELAXED, guard)
            .is_ok();
        if ok {
            // The CAS that swings the predecessor is unique, so exactly one
            // helper retires the node.
            unsafe { guard.defer_destroy(right) };
        }
        ok
    }

    /// Locate the boundary around `key`: returns `(left, right)` with
    /// `left.key < key <= right.key` and `left.next == right` observed
    /// untagged. Marked nodes met on the way are helped out of the chain.
    fn search<'g>(&self, key: Key, guard: &'g Guard) -> (Shared<'g, Node>, Shared<'g, Node>) {
        let mut left = self.head.load(READ_ORD, guard);
        let mut left_ref = unsafe { left.deref() };
        let mut right = left_ref.next.load(READ_ORD, guard).with_tag(0);
        loop {
            let right_ref = unsafe { right.deref() };
            let right_next = right_ref.next.load(READ_ORD, guard);
            if right_next.tag() == 0 {
                if right_ref.key >= key {
                    return (left, right);
                }
                left = right;
                left_ref = right_ref;
            } else {
                Self::unlink_right(left_ref, right, guard);
            }
            right = right_next.with_tag(0);
        }
    }
}

impl ConcurrentSet for HarrisList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = head.next.load(READ_ORD, guard).with_tag(0);
        let mut node_ref = unsafe { node.deref() };
        while node_ref.key < key {
            node = node_ref.next.load(READ_ORD, guard).with_tag(0);
            node_ref = unsafe { node.deref() };
        }
        if node_ref.key == key && node_ref.next.load(READ_ORD, guard).tag() == 0 {
            Some(node_ref.val)
        } else {
            None
        }
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let mut node = Owned::new(Node::new(key, val, Atomic::null()));
        loop {
            let (left, right) = self.search(key, guard);
            if unsafe { right.deref() }.key == key {
                return false;
            }
            node.next.store(right, RELAXED);
            match unsafe { left.deref() }.next.compare_exchange(
                right,
                node,
                MARK_ORD,
                RELAXED,
                guard,
            ) {
                Ok(_) => return true,
                Err(e) => node = e.new,
            }
        }
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        loop {
            let (left, right) = self.search(key, guard);
            let right_ref = unsafe { right.deref() };
            if right_ref.key != key {
                return None;
            }
            let unmarked = right_ref.next.load(READ_ORD, guard).with_tag(0);
            if right_ref
                .next
                .compare_exchange(unmarked, unmarked.with_tag(1), MARK_ORD, RELAXED, guard)
                .is_ok()
            {
                let val = right_ref.val;
                // Attempt physical removal; if the CAS loses, a later search
                // completes it.
                Self::unlink_right(unsafe { left.deref() }, right, guard);
                return Some(val);
            }
        }
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = head.next.load(READ_ORD, guard).with_tag(0);
        let mut size = 0;
        loop {
            let node_ref = unsafe { node.deref() };
            let next = node_ref.next.load(READ_ORD, guard);
            if next.with_tag(0).is_null() {
                // Reached the tail sentinel.
                return size;
            }
            if next.tag() == 0 {
                size += 1;
            }
            node = next.with_tag(0);
        }
    }
}

impl Drop for HarrisList {
    fn drop(&mut self) {
        // Exclusive access: free the whole chain, sentinels included.
        unsafe {
            let guard = epoch::unprotected();
            let mut node = self.head.load(RELAXED, guard);
            while !node.is_null() {
                let next = node.deref().next.load(RELAXED, guard).with_tag(0);
                drop(node.into_owned());
                node = next;
            }
        }
    }
}

#[cfg(test)]
impl HarrisList {
    /// Keys of live nodes in traversal order, for invariant checks.
    fn keys_in_order(&self) -> Vec<Key> {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = head.next.load(READ_ORD, guard).with_tag(0);
        let mut keys = Vec::new();
        loop {
            let node_ref = unsafe { node.deref() };
            let next = node_ref.next.load(READ_ORD, guard);
            if next.with_tag(0).is_null() {
                return keys;
            }
            if next.tag() == 0 {
                keys.push(node_ref.key);
            }
            node = next.with_tag(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_sorted_and_duplicate_free() {
        let list = HarrisList::new();
        for key in [5, 3, 9, 1, 7, 3, 5] {
            list.insert(key, key * 10);
        }
        assert_eq!(list.keys_in_order(), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn delete_unlinks_from_traversal() {
        let list = HarrisList::new();
        for key in [1, 2, 3] {
            assert!(list.insert(key, key));
        }
        assert_eq!(list.delete(2), Some(2));
        assert_eq!(list.keys_in_order(), vec![1, 3]);
        assert_eq!(list.size(), 2);
    }

    #[test]
    fn helping_completes_partial_removal() {
        // A marked node left by a delete whose helping CAS lost is cleaned
        // by the next search through the area.
        let list = HarrisList::new();
        for key in 1..=8 {
            list.insert(key, key);
        }
        for key in (1..=8).step_by(2) {
            assert_eq!(list.delete(key), Some(key));
        }
        assert_eq!(list.keys_in_order(), vec![2, 4, 6, 8]);
        assert_eq!(list.size(), 4);
    }
}
