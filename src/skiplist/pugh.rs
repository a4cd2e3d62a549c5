//! Pugh concurrent skip list.
//!
//! W. Pugh, "Concurrent Maintenance of Skip Lists", technical report, 1990.
//!
//! Insert links upward one level at a time, taking one predecessor lock per
//! level hand-over-hand. Delete locks the victim and then, per level
//! top-down, the predecessor; after unlinking a level the victim's forward
//! pointer is redirected *backwards* at the predecessor, so a traversal
//! caught inside the removed tower backs out and re-advances instead of
//! running along a stale chain. The backward pointer also lets the victim
//! hunt detect already-removed towers (`next[0].key < key`).

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};

use crate::config::{SetConfig, LEVEL_CAP, LEVEL_CAP_SMALL};
use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;
use crate::skiplist::random_level;
use crate::ttas::Spinlock;

struct Node {
    key: Key,
    val: Val,
    toplevel: usize,
    lock: Spinlock,
    next: Box<[Atomic<Node>]>,
}

impl Node {
    fn new(key: Key, val: Val, toplevel: usize, level_max: usize) -> Self {
        Self {
            key,
            val,
            toplevel,
            lock: Spinlock::new(),
            next: (0..level_max).map(|_| Atomic::null()).collect(),
        }
    }
}

/// Pugh skip list with per-node spinlocks.
pub struct PughSkipList {
    head: Atomic<Node>,
    level_max: usize,
}

impl PughSkipList {
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

    /// Lock the live predecessor of `key` at `level`, starting from `pred`.
    fn get_lock<'g>(
        mut pred: &'g Node,
        key: Key,
        level: usize,
        guard: &'g Guard,
    ) -> &'g Node {
        let mut succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
        while succ.key < key {
            pred = succ;
            succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
        }
        pred.lock.lock();
        let mut succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
        while succ.key < key {
            // A removed predecessor's forward pointer leads back before the
            // key, so this loop also walks out of deleted towers.
            pred.lock.unlock();
            pred = succ;
            pred.lock.lock();
            succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
        }
        pred
    }
}

impl ConcurrentSet for PughSkipList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut pred = unsafe { self.head.load(READ_ORD, guard).deref() };
        for level in (0..self.level_max).rev() {
            let mut succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
            while succ.key < key {
                pred = succ;
                succ = unsafe { succ.next[level].load(READ_ORD, guard).deref() };
            }
            if succ.key == key {
                return Some(succ.val);
            }
        }
        None
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let mut update: [Shared<'_, Node>; LEVEL_CAP] = [Shared::null(); LEVEL_CAP];
        let mut pred = unsafe { self.head.load(READ_ORD, guard).deref() };
        for level in (0..self.level_max).rev() {
            let mut succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
            while succ.key < key {
                pred = succ;
                succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
            }
            if succ.key == key {
                return false;
            }
            update[level] = Shared::from(pred as *const Node);
        }

        let toplevel = random_level(self.level_max);

        let pred = Self::get_lock(pred, key, 0, guard);
        if unsafe { pred.next[0].load(READ_ORD, guard).deref() }.key == key {
            pred.lock.unlock();
            return false;
        }

        let node = Owned::new(Node::new(key, val, toplevel, self.level_max));
        node.lock.lock();
        node.next[0].store(pred.next[0].load(READ_ORD, guard), RELAXED);
        let node = node.into_shared(guard);
        let node_ref = unsafe { node.deref() };
        pred.next[0].store(node, WRITE_ORD);
        pred.lock.unlock();
        for level in 1..toplevel {
            let start = unsafe { update[level].deref() };
            let pred = Self::get_lock(start, key, level, guard);
            node_ref.next[level].store(pred.next[level].load(READ_ORD, guard), WRITE_ORD);
            pred.next[level].store(node, WRITE_ORD);
            pred.lock.unlock();
        }
        node_ref.lock.unlock();
        true
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut update: [Shared<'_, Node>; LEVEL_CAP] = [Shared::null(); LEVEL_CAP];
        let mut pred = unsafe { self.head.load(READ_ORD, guard).deref() };
        for level in (0..self.level_max).rev() {
            let mut succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
            while succ.key < key {
                pred = succ;
                succ = unsafe { pred.next[level].load(READ_ORD, guard).deref() };
            }
            update[level] = Shared::from(pred as *const Node);
        }

        // Hunt down and lock the victim.
        let mut succ_shared;
        let mut succ = pred;
        loop {
            succ_shared = succ.next[0].load(READ_ORD, guard);
            succ = unsafe { succ_shared.deref() };
            if succ.key > key {
                return None;
            }
            succ.lock.lock();
            // A removed tower points backwards at level 0; skip it.
            let live = succ.key <= unsafe { succ.next[0].load(READ_ORD, guard).deref() }.key;
            if live && succ.key == key {
                break;
            }
            succ.lock.unlock();
        }

        for level in (0..succ.toplevel).rev() {
            let start = unsafe { update[level].deref() };
            let pred = Self::get_lock(start, key, level, guard);
            pred.next[level].store(succ.next[level].load(READ_ORD, guard), WRITE_ORD);
            // Redirect the removed level at its predecessor so stuck
            // traversals back out.
            succ.next[level].store(Shared::from(pred as *const Node), WRITE_ORD);
            pred.lock.unlock();
        }
        let val = succ.val;
        succ.lock.unlock();
        unsafe { guard.defer_destroy(succ_shared) };
        Some(val)
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
            size += 1;
            node = unsafe { next.deref() };
        }
    }
}

impl Drop for PughSkipList {
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
