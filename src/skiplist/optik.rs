//! Skip list with version-validated commits.
//!
//! The search keeps, per level, the predecessor *and the version its lock
//! had before its forward pointer was read*; no successor bookkeeping is
//! needed because the commit-time `try_lock_version` CAS revalidates the
//! predecessor wholesale. Insert links bottom-up, re-searching from the
//! first level whose predecessor moved, and publishes a `state` flag once
//! fully linked. Delete claims the victim by publishing the deleted
//! sentinel into its lock word, then acquires the predecessor locks with
//! their versions and unlinks.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::AtomicU32;

use crate::config::{SetConfig, LEVEL_CAP};
use crate::key::{Key, Val, KEY_MAX, KEY_MIN};
use crate::optik::{OptikLock, Snapshot};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;
use crate::skiplist::random_level;

struct Node {
    key: Key,
    val: Val,
    toplevel: usize,
    /// Zero until the tower is linked at every level.
    state: AtomicU32,
    lock: OptikLock,
    next: Box<[Atomic<Node>]>,
}

impl Node {
    fn new(key: Key, val: Val, toplevel: usize, level_max: usize) -> Self {
        Self {
            key,
            val,
            toplevel,
            state: AtomicU32::new(0),
            lock: OptikLock::new(),
            next: (0..level_max).map(|_| Atomic::null()).collect(),
        }
    }
}

/// Skip list with one versioned lock per node.
pub struct OptikSkipList {
    head: Atomic<Node>,
    level_max: usize,
}

impl OptikSkipList {
    /// Empty skip list; sentinels are full-height towers.
    #[must_use]
    pub fn new(config: &SetConfig) -> Self {
        let level_max = config.level_max.min(LEVEL_CAP).max(1);
        let guard = &epoch::pin();
        let tail = Owned::new(Node::new(KEY_MAX, 0, level_max, level_max));
        tail.state.store(1, RELAXED);
        let tail = tail.into_shared(guard);
        let head = Owned::new(Node::new(KEY_MIN, 0, level_max, level_max));
        head.state.store(1, RELAXED);
        for level in &*head.next {
            level.store(tail, RELAXED);
        }
        Self {
            head: Atomic::from(head),
            level_max,
        }
    }

    /// Fill `preds`/`predsv` per level and return the matching node (with
    /// its version) when found. Restarts when a recorded predecessor was
    /// already deleted.
    fn search<'g>(
        &self,
        key: Key,
        preds: &mut [Shared<'g, Node>],
        predsv: &mut [Snapshot],
        guard: &'g Guard,
    ) -> Option<(Shared<'g, Node>, Snapshot)> {
        'restart: loop {
            let mut node_found = None;
            let mut pred = self.head.load(READ_ORD, guard);
            let mut predv = unsafe { pred.deref() }.lock.load();
            for i in (0..self.level_max).rev() {
                let mut curr = unsafe { pred.deref() }.next[i].load(READ_ORD, guard);
                let mut currv = unsafe { curr.deref() }.lock.load();
                while key > unsafe { curr.deref() }.key {
                    predv = currv;
                    pred = curr;
                    curr = unsafe { pred.deref() }.next[i].load(READ_ORD, guard);
                    currv = unsafe { curr.deref() }.lock.load();
                }
                if predv.is_deleted() {
                    continue 'restart;
                }
                preds[i] = pred;
                predsv[i] = predv;
                if key == unsafe { curr.deref() }.key {
                    node_found = Some((curr, currv));
                }
            }
            return node_found;
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

    /// Unlock `nodes[low..=high]` top-down, skipping duplicates.
    fn unlock_levels_down(nodes: &[Shared<'_, Node>], low: usize, high: isize) {
        let mut old = Shared::null();
        let mut i = high;
        while i >= low as isize {
            let node = nodes[i as usize];
            if node != old {
                unsafe { node.deref() }.lock.unlock();
            }
            old = node;
            i -= 1;
        }
    }
}

impl ConcurrentSet for OptikSkipList {
    fn find(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        match self.left_search(key, guard) {
            Some(node) if !node.lock.is_deleted() => Some(node.val),
            _ => None,
        }
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let mut preds = [Shared::null(); LEVEL_CAP];
        let mut predsv = [Snapshot::default(); LEVEL_CAP];
        let toplevel = random_level(self.level_max);
        let mut inserted_upto = 0;
        let mut node: Option<Shared<'_, Node>> = None;

        'restart: loop {
            let node_found = self.search(
                key,
                &mut preds[..self.level_max],
                &mut predsv[..self.level_max],
                guard,
            );
            if let Some((found, _)) = node_found {
                if inserted_upto == 0 {
                    if !unsafe { found.deref() }.lock.is_deleted() {
                        if let Some(unlinked) = node.take() {
                            // Allocated on an earlier round but never
                            // linked anywhere; reclaim it directly.
                            unsafe { drop(unlinked.into_owned()) };
                        }
                        return false;
                    }
                    // A logically deleted tower still shadows the key; wait
                    // for its physical removal.
                    continue 'restart;
                }
            }
            let node_shared = *node.get_or_insert_with(|| {
                Owned::new(Node::new(key, val, toplevel, self.level_max)).into_shared(guard)
            });
            let node_ref = unsafe { node_shared.deref() };

            let mut pred_prev = Shared::null();
            for i in inserted_upto..toplevel {
                let pred = preds[i];
                let pred_ref = unsafe { pred.deref() };
                if pred != pred_prev && !pred_ref.lock.try_lock_version(predsv[i]) {
                    Self::unlock_levels_down(&preds, inserted_upto, i as isize - 1);
                    inserted_upto = i;
                    continue 'restart;
                }
                node_ref.next[i].store(pred_ref.next[i].load(READ_ORD, guard), WRITE_ORD);
                pred_ref.next[i].store(node_shared, WRITE_ORD);
                pred_prev = pred;
            }
            node_ref.state.store(1, WRITE_ORD);
            Self::unlock_levels_down(&preds, inserted_upto, toplevel as isize - 1);
            return true;
        }
    }

    fn delete(&self, key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let mut preds = [Shared::null(); LEVEL_CAP];
        let mut predsv = [Snapshot::default(); LEVEL_CAP];
        let mut my_delete = false;

        'restart: loop {
            let node_found = self.search(
                key,
                &mut preds[..self.level_max],
                &mut predsv[..self.level_max],
                guard,
            );
            let Some((found, foundv)) = node_found else {
                return None;
            };
            let found_ref = unsafe { found.deref() };

            if !my_delete {
                if found_ref.lock.is_deleted() || found_ref.state.load(READ_ORD) == 0 {
                    return None;
                }
                if !found_ref.lock.try_lock_delete(foundv) {
                    if found_ref.lock.is_deleted() {
                        return None;
                    }
                    continue 'restart;
                }
            }
            my_delete = true;

            let toplevel = found_ref.toplevel;
            let mut pred_prev = Shared::null();
            for i in 0..toplevel {
                let pred = preds[i];
                if pred != pred_prev && !unsafe { pred.deref() }.lock.try_lock_version(predsv[i]) {
                    Self::unlock_levels_down(&preds, 0, i as isize - 1);
                    continue 'restart;
                }
                pred_prev = pred;
            }

            for i in 0..toplevel {
                unsafe { preds[i].deref() }.next[i]
                    .store(found_ref.next[i].load(READ_ORD, guard), WRITE_ORD);
            }
            Self::unlock_levels_down(&preds, 0, toplevel as isize - 1);
            unsafe { guard.defer_destroy(found) };
            return Some(found_ref.val);
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
            if !node.lock.is_deleted() {
                size += 1;
            }
            node = unsafe { next.deref() };
        }
    }
}

impl Drop for OptikSkipList {
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
