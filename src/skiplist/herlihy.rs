//! Herlihy optimistic skip list with fine-grained locking.
//!
//! M. Herlihy, Y. Lev, V. Luchangco, N. Shavit, "A Simple Optimistic
//! Skiplist Algorithm", SIROCCO 2007.
//!
//! Searches take no locks. Insert locks every predecessor bottom-up,
//! validates `!pred.marked && !succ.marked && pred.next[i] == succ`, links
//! the tower level by level, and publishes `fully_linked` last. Delete
//! marks the victim under its own lock first, then locks predecessors and
//! unlinks top-down. Validation failures back off exponentially.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::AtomicBool;

use crate::config::{SetConfig, LEVEL_CAP};
use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;
use crate::skiplist::random_level;
use crate::ttas::Spinlock;

/// Backoff threshold beyond which a failed validation yields the scheduler.
const BACKOFF_YIELD: u64 = 5000;

struct Node {
    key: Key,
    val: Val,
    toplevel: usize,
    marked: AtomicBool,
    fully_linked: AtomicBool,
    lock: Spinlock,
    next: Box<[Atomic<Node>]>,
}

impl Node {
    fn new(key: Key, val: Val, toplevel: usize) -> Self {
        Self {
            key,
            val,
            toplevel,
            marked: AtomicBool::new(false),
            fully_linked: AtomicBool::new(false),
            lock: Spinlock::new(),
            next: (0..toplevel).map(|_| Atomic::null()).collect(),
        }
    }
}

/// Optimistic lock-based skip list.
pub struct HerlihySkipList {
    head: Atomic<Node>,
    level_max: usize,
}

impl HerlihySkipList {
    /// Empty skip list; sentinels are full-height and fully linked.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        let level_max = config.level_max.min(LEVEL_CAP).max(1);
        let guard = &epoch::pin();
        let tail = Owned::new(Node::new(KEY_MAX, 0, level_max));
        tail.fully_linked.store(true, RELAXED);
        let tail = tail.into_shared(guard);
        let head = Owned::new(Node::new(KEY_MIN, 0, level_max));
        head.fully_linked.store(true, RELAXED);
        for level in &*head.next {
            level.store(tail, RELAXED);
        }
        Self {
            head: Atomic::from(head),
            level_max,
        }
    }

    /// Optimistic search. Fills `succs` (and `preds` when given) and
    /// returns the highest level at which the key was found, if any.
    /// Restarts when a recorded predecessor is already marked.
    fn search<'g>(
        &self,
        key: Key,
        mut preds: Option<&mut [Shared<'g, Node>]>,
        succs: &mut [Shared<'g, Node>],
        guard: &'g Guard,
    ) -> Option<usize> {
        'restart: loop {
            let mut found = None;
            let mut pred = self.head.load(READ_ORD, guard);
            for i in (0..self.level_max).rev() {
                let mut curr = unsafe { pred.deref() }.next[i].load(READ_ORD, guard);
                while key > unsafe { curr.deref() }.key {
                    pred = curr;
                    curr = unsafe { pred.deref() }.next[i].load(READ_ORD, guard);
                }
                if let Some(preds) = preds.as_deref_mut() {
                    preds[i] = pred;
                    if unsafe { pred.deref() }.marked.load(READ_ORD) {
                        std::thread::yield_now();
                        continue 'restart;
                    }
                }
                succs[i] = curr;
                if found.is_none() && key == unsafe { curr.deref() }.key {
                    found = Some(i);
                }
            }
            return found;
        }
    }

    /// Lock-free lookup descending until the key is met.
    fn left_search<'g>(&self, key: Key, guard: &'g Guard) -> Option<&'g Node> {
        let mut pred = unsafe { self.head.load(READ_ORD, guard).deref() };
        for i in (0..self.level_max).rev() {
            let mut curr = unsafe { pred.next[i].load(READ_ORD, guard).deref() };
            while key > curr.key {
                pred = curr;
                curr = unsafe { pred.next[i].load(READ_ORD, guard).deref() };
            }
            if key == curr.key {
                return Some(curr);
            }
        }
        None
    }

    /// Unlock `nodes[0..=highest]`, skipping consecutive duplicates.
    fn unlock_levels(nodes: &[Shared<'_, Node>], highest: usize) {
        let mut old = Shared::null();
        for &node in nodes.iter().take(highest + 1) {
            if node != old {
                unsafe { node.deref() }.lock.unlock();
            }
            old = node;
        }
    }

    fn ok_to_delete(node: &Node, found: usize) -> bool {
        node.fully_linked.load(READ_ORD) && node.toplevel - 1 == found && !node.marked.load(READ_ORD)
    }
}

impl ConcurrentSet for HerlihySkipList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        match self.left_search(key, guard) {
            Some(node)
                if !node.marked.load(READ_ORD) && node.fully_linked.load(READ_ORD) =>
            {
                Some(node.val)
            }
            _ => None,
        }
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let mut preds = [Shared::null(); LEVEL_CAP];
        let mut succs = [Shared::null(); LEVEL_CAP];
        let toplevel = random_level(self.level_max);
        let mut backoff: u64 = 1;

        loop {
            let found = self.search(
                key,
                Some(&mut preds[..self.level_max]),
                &mut succs[..self.level_max],
                guard,
            );
            if let Some(found) = found {
                let node_found = unsafe { succs[found].deref() };
                if !node_found.marked.load(READ_ORD) {
                    // An in-flight insert for the same key wins; wait until
                    // it is visible before reporting the duplicate.
                    while !node_found.fully_linked.load(READ_ORD) {
                        std::thread::yield_now();
                    }
                    return false;
                }
                continue;
            }

            let mut highest_locked = None;
            let mut prev_pred = Shared::null();
            let mut valid = true;
            for i in 0..toplevel {
                if !valid {
                    break;
                }
                let pred = preds[i];
                let succ = succs[i];
                if pred != prev_pred {
                    unsafe { pred.deref() }.lock.lock();
                    highest_locked = Some(i);
                    prev_pred = pred;
                }
                let pred_ref = unsafe { pred.deref() };
                let succ_ref = unsafe { succ.deref() };
                valid = !pred_ref.marked.load(READ_ORD)
                    && !succ_ref.marked.load(READ_ORD)
                    && pred_ref.next[i].load(READ_ORD, guard) == succ;
            }

            if !valid {
                if let Some(highest) = highest_locked {
                    Self::unlock_levels(&preds, highest);
                }
                if backoff > BACKOFF_YIELD {
                    std::thread::yield_now();
                }
                backoff = backoff.saturating_mul(2);
                continue;
            }

            let node = Owned::new(Node::new(key, val, toplevel));
            for i in 0..toplevel {
                node.next[i].store(succs[i], RELAXED);
            }
            let node = node.into_shared(guard);
            for i in 0..toplevel {
                unsafe { preds[i].deref() }.next[i].store(node, WRITE_ORD);
            }
            unsafe { node.deref() }.fully_linked.store(true, WRITE_ORD);

            if let Some(highest) = highest_locked {
                Self::unlock_levels(&preds, highest);
            }
            return true;
        }
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut preds = [Shared::null(); LEVEL_CAP];
        let mut succs = [Shared::null(); LEVEL_CAP];
        let mut node_todel = Shared::null();
        let mut is_marked = false;
        let mut toplevel = 0;
        let mut backoff: u64 = 1;

        loop {
            let found = self.search(
                key,
                Some(&mut preds[..self.level_max]),
                &mut succs[..self.level_max],
                guard,
            );

            let deletable = match found {
                Some(found) => Self::ok_to_delete(unsafe { succs[found].deref() }, found),
                None => false,
            };
            if !(is_marked || deletable) {
                return None;
            }

            if !is_marked {
                node_todel = succs[found.unwrap_or(0)];
                let node_ref = unsafe { node_todel.deref() };
                node_ref.lock.lock();
                toplevel = node_ref.toplevel;
                // Unless it was marked in the meantime.
                if node_ref.marked.load(READ_ORD) {
                    node_ref.lock.unlock();
                    return None;
                }
                node_ref.marked.store(true, WRITE_ORD);
                is_marked = true;
            }
            let node_ref = unsafe { node_todel.deref() };

            // Physical removal under predecessor locks.
            let mut highest_locked = None;
            let mut prev_pred = Shared::null();
            let mut valid = true;
            for i in 0..toplevel {
                if !valid {
                    break;
                }
                let pred = preds[i];
                if pred != prev_pred {
                    unsafe { pred.deref() }.lock.lock();
                    highest_locked = Some(i);
                    prev_pred = pred;
                }
                let pred_ref = unsafe { pred.deref() };
                valid = !pred_ref.marked.load(READ_ORD)
                    && pred_ref.next[i].load(READ_ORD, guard) == succs[i];
            }

            if !valid {
                if let Some(highest) = highest_locked {
                    Self::unlock_levels(&preds, highest);
                }
                if backoff > BACKOFF_YIELD {
                    std::thread::yield_now();
                }
                backoff = backoff.saturating_mul(2);
                continue;
            }

            for i in (0..toplevel).rev() {
                unsafe { preds[i].deref() }.next[i]
                    .store(node_ref.next[i].load(READ_ORD, guard), WRITE_ORD);
            }
            let val = node_ref.val;

            node_ref.lock.unlock();
            if let Some(highest) = highest_locked {
                Self::unlock_levels(&preds, highest);
            }
            unsafe { guard.defer_destroy(node_todel) };
            return Some(val);
        }
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let head = unsafe { self.head.load(READ_ORD, guard).deref() };
        let mut node = unsafe { head.next[0].load(READ_ORD, guard).deref() };
        let mut size = 0;
        loop {
            let next = node.next[0].load(READ_ORD, guard);
            if next.is_null() {
                return size;
            }
            if node.fully_linked.load(READ_ORD) && !node.marked.load(READ_ORD) {
                size += 1;
            }
            node = unsafe { next.deref() };
        }
    }
}

impl Drop for HerlihySkipList {
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
