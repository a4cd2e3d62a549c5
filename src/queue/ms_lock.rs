//! Two-lock Michael-Scott queue.
//!
//! One mutex serializes enqueuers on `tail`, another serializes dequeuers
//! on `head`; the dummy node keeps the two from ever touching the same
//! pointer. Pointer fields stay atomic because `size` traverses without
//! taking either lock.

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

/// Lock-based FIFO queue.
pub struct MsLockQueue {
    head: Atomic<Node>,
    tail: Atomic<Node>,
    head_lock: Mutex<()>,
    tail_lock: Mutex<()>,
}

impl Default for MsLockQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MsLockQueue {
    /// Empty queue holding one dummy node.
    #[must_use]
    pub fn new() -> Self {
        let guard = &epoch::pin();
        let dummy = Owned::new(Node {
            key: 0,
            val: 0,
            next: Atomic::null(),
        })
        .into_shared(guard);
        Self {
            head: Atomic::from(dummy),
            tail: Atomic::from(dummy),
            head_lock: Mutex::new(()),
            tail_lock: Mutex::new(()),
        }
    }
}

impl ConcurrentSet for MsLockQueue {
    fn find(&self, _key: Key) -> Option<Val> {
        Some(0)
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let node = Owned::new(Node {
            key,
            val,
            next: Atomic::null(),
        })
        .into_shared(guard);
        let _locked = self.tail_lock.lock();
        let tail = self.tail.load(READ_ORD, guard);
        unsafe { tail.deref() }.next.store(node, WRITE_ORD);
        self.tail.store(node, WRITE_ORD);
        true
    }

    /// Dequeue the head entry; the key argument is ignored.
    fn delete(&self, _key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        let _locked = self.head_lock.lock();
        let head = self.head.load(READ_ORD, guard);
        let next = unsafe { head.deref() }.next.load(READ_ORD, guard);
        let Some(next_ref) = (unsafe { next.as_ref() }) else {
            return None;
        };
        self.head.store(next, WRITE_ORD);
        unsafe { guard.defer_destroy(head) };
        Some(next_ref.val)
    }

    fn size(&self) -> usize {
        let guard = &epoch::pin();
        let mut node = self.head.load(READ_ORD, guard);
        let mut size = 0;
        loop {
            let next = unsafe { node.deref() }.next.load(READ_ORD, guard);
            if next.is_null() {
                return size;
            }
            size += 1;
            node = next;
        }
    }

    fn find_is_def(&self) -> bool {
        false
    }
}

impl Drop for MsLockQueue {
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
