//! Lotan-Shavit skip-list priority queue.
//!
//! I. Lotan, N. Shavit, "Skiplist-Based Concurrent Priority Queues",
//! IPDPS 2000.
//!
//! A Fraser-style lock-free skip list where `delete` ignores its key:
//! it walks level 0 from the head and claims the first tower whose forward
//! pointers it manages to mark, the claim token being the level-0 marking
//! CAS. The winner runs one cleanup search and retires the node.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};

use crate::config::{SetConfig, LEVEL_CAP};
use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::ordering::{MARK_ORD, READ_ORD, RELAXED};
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

/// Skip-list priority queue; `delete` removes the minimum key.
pub struct LotanShavitQueue {
    head: Atomic<Node>,
    level_max: usize,
}

impl LotanShavitQueue {
    /// Empty queue; sentinels are full-height towers.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        let level_max = config.level_max.min(LEVEL_CAP).max(1);
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

    /// Boundary search with cleanup, as in the Fraser list. Returns whether
    /// the right boundary at level 0 carries `key`.
    fn search<'g>(
        &self,
        key: Key,
        mut preds: Option<&mut [Shared<'g, Node>]>,
        mut succs: Option<&mut [Shared<'g, Node>]>,
        guard: &'g Guard,
    ) -> bool {
        'retry: loop {
            let mut left = self.head.load(READ_ORD, guard);
            let mut left_ref = unsafe { left.deref() };
            let mut right = Shared::null();
            for i in (0..self.level_max).rev() {
                let mut left_next = left_ref.next[i].load(READ_ORD, guard);
                if left_next.tag() != 0 {
                    continue 'retry;
                }
                right = left_next;
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
            return unsafe { right.deref() }.key == key;
        }
    }

    /// Boundary search without helping, used by insert to keep the common
    /// path cheap.
    fn search_no_cleanup<'g>(
        &self,
        key: Key,
        preds: &mut [Shared<'g, Node>],
        succs: &mut [Shared<'g, Node>],
        guard: &'g Guard,
    ) -> bool {
        let mut left = self.head.load(READ_ORD, guard);
        let mut right = Shared::null();
        for i in (0..self.level_max).rev() {
            let left_ref = unsafe { left.deref() };
            right = left_ref.next[i].load(READ_ORD, guard).with_tag(0);
            loop {
                let right_ref = unsafe { right.deref() };
                let right_next = right_ref.next[i].load(READ_ORD, guard);
                if right_next.tag() == 0 {
                    if right_ref.key >= key {
                        break;
                    }
                    left = right;
                }
                right = right_next.with_tag(0);
            }
            preds[i] = left;
            succs[i] = right;
        }
        unsafe { right.deref() }.key == key
    }

    /// Mark every forward pointer of `node` top-down. The return value is
    /// the outcome of the level-0 CAS: true means this thread claimed the
    /// tower.
    fn mark_tower_claim(node: &Node, guard: &Guard) -> bool {
        let mut claimed = false;
        for i in (0..node.toplevel).rev() {
            loop {
                let next = node.next[i].load(READ_ORD, guard);
                if next.tag() != 0 {
                    claimed = false;
                    break;
                }
                if node.next[i]
                    .compare_exchange(next, next.with_tag(1), MARK_ORD, RELAXED, guard)
                    .is_ok()
                {
                    claimed = true;
                    break;
                }
            }
        }
        claimed
    }
}

impl ConcurrentSet for LotanShavitQueue {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        // Left-biased descent that also skips marked towers.
        let mut left_prev = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut left = left_prev;
        for level in (0..self.level_max).rev() {
            left = unsafe {
                left_prev.next[level]
                    .load(READ_ORD, guard)
                    .with_tag(0)
                    .deref()
            };
            loop {
                let left_next = left.next[level].load(READ_ORD, guard);
                if left.key >= key && left_next.tag() == 0 {
                    break;
                }
                if left_next.tag() == 0 {
                    left_prev = left;
                }
                left = unsafe { left_next.with_tag(0).deref() };
            }
            if left.key == key {
                break;
            }
        }
        if left.key == key {
            Some(left.val)
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
            if self.search_no_cleanup(
                key,
                &mut preds[..self.level_max],
                &mut succs[..self.level_max],
                guard,
            ) {
                return false;
            }
            for i in 0..toplevel {
                node.next[i].store(succs[i], RELAXED);
            }
            match unsafe { preds[0].deref() }.next[0].compare_exchange(
                succs[0].with_tag(0),
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
                let new_next = node_ref.next[i].load(READ_ORD, guard);
                if new_next.tag() != 0 {
                    return true;
                }
                // Keep our forward pointer current before exposing the
                // level; linking through a stale successor would resurrect
                // a node another thread already retired.
                if new_next != succ
                    && node_ref.next[i]
                        .compare_exchange(new_next.with_tag(0), succ, MARK_ORD, RELAXED, guard)
                        .is_err()
                {
                    break;
                }
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

    /// Remove the minimum: the key argument is ignored.
    fn delete(&self, _key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = head.next[0].load(READ_ORD, guard).with_tag(0);
        loop {
            let node_ref = unsafe { node.deref() };
            let next = node_ref.next[0].load(READ_ORD, guard);
            if next.with_tag(0).is_null() {
                return None;
            }
            if node_ref.next[node_ref.toplevel - 1].load(READ_ORD, guard).tag() == 0
                && Self::mark_tower_claim(node_ref, guard)
            {
                let result = node_ref.val;
                self.search(node_ref.key, None, None, guard);
                unsafe { guard.defer_destroy(node) };
                return Some(result);
            }
            node = node_ref.next[0].load(READ_ORD, guard).with_tag(0);
        }
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

impl Drop for LotanShavitQueue {
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
mod tests {
    use super::*;

    fn config() -> SetConfig {
        SetConfig {
            level_max: 8,
            ..SetConfig::default()
        }
    }

    #[test]
    fn drains_in_ascending_key_order() {
        let pq = LotanShavitQueue::new(&config());
        for key in [30, 10, 20, 50, 40] {
            assert!(pq.insert(key, key * 2));
        }
        let mut drained = Vec::new();
        while let Some(val) = pq.delete(0) {
            drained.push(val);
        }
        assert_eq!(drained, vec![20, 40, 60, 80, 100]);
        assert_eq!(pq.size(), 0);
    }

    #[test]
    fn delete_on_empty_is_none() {
        let pq = LotanShavitQueue::new(&config());
        assert_eq!(pq.delete(0), None);
        assert!(pq.insert(1, 11));
        assert_eq!(pq.delete(99), Some(11));
        assert_eq!(pq.delete(0), None);
    }
}
