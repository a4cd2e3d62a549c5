//! Lock-based stack.
//!
//! One mutex around `top`. The pointer stays atomic because `size`
//! traverses without the lock.

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use parking_lot::Mutex;

use crate::key::{Key, Val};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
}

/// Mutex-guarded LIFO stack.
pub struct LockStack {
    top: Atomic<Node>,
    lock: Mutex<()>,
}

impl Default for LockStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStack {
    /// Empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            top: Atomic::null(),
            lock: Mutex::new(()),
        }
    }
}

impl ConcurrentSet for LockStack {
    fn find(&self, _key: Key) -> Option<Val> {
        Some(0)
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let node = Owned::new(Node {
            key,
            val,
            next: Atomic::null(),
        });
        let _locked = self.lock.lock();
        node.next.store(self.top.load(READ_ORD, guard), RELAXED);
        self.top.store(node, WRITE_ORD);
        true
    }

    /// Pop the top entry; the key argument is ignored.
    fn delete(&self, _key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let _locked = self.lock.lock();
        let top = self.top.load(READ_ORD, guard);
        let top_ref = unsafe { top.as_ref() }?;
        self.top.store(top_ref.next.load(READ_ORD, guard), WRITE_ORD);
        let val = top_ref.val;
        unsafe { guard.defer_destroy(top) };
        Some(val)
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let mut node = self.top.load(READ_ORD, guard);
        let mut size = 0;
        while let Some(node_ref) = unsafe { node.as_ref() } {
            size += 1;
            node = node_ref.next.load(READ_ORD, guard);
        }
        size
    }

    fn find_is_def(&self) -> bool {
        false
    }
}

impl Drop for LockStack {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut node = self.top.load(RELAXED, guard);
            while !node.is_null() {
                let next = node.deref().next.load(RELAXED, guard);
                drop(node.into_owned());
                node = next;
            }
        }
    }
}
