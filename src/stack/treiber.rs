//! Treiber lock-free stack.
//!
//! R. K. Treiber, "Systems Programming: Coping with Parallelism", 1986.
//! A single CAS on `top` per push and pop; the popping thread retires the
//! node it removed, which (with epoch protection) is what keeps the
//! classic ABA hazard out of the pop CAS.

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::CachePadded;

use crate::key::{Key, Val};
use crate::ordering::{MARK_ORD, READ_ORD, RELAXED};
use crate::set::ConcurrentSet;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
}

/// Lock-free LIFO stack.
pub struct TreiberStack {
    top: CachePadded<Atomic<Node>>,
}

impl Default for TreiberStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TreiberStack {
    /// Empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            top: CachePadded::new(Atomic::null()),
        }
    }
}

impl ConcurrentSet for TreiberStack {
    fn find(&self, _key: Key) -> Option<Val> {
        // Stacks have no meaningful lookup; presence is trivially true.
        Some(0)
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let mut node = Owned::new(Node {
            key,
            val,
            next: Atomic::null(),
        });
        loop {
            let top = self.top.load(READ_ORD, guard);
            node.next.store(top, RELAXED);
            match self.top.compare_exchange(top, node, MARK_ORD, RELAXED, guard) {
                Ok(_) => return true,
                Err(e) => node = e.new,
            }
            std::hint::spin_loop();
        }
    }

    /// Pop the top entry; the key argument is ignored.
    fn delete(&self, _key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        loop {
            let top = self.top.load(READ_ORD, guard);
            let top_ref = unsafe { top.as_ref() }?;
            let next = top_ref.next.load(READ_ORD, guard);
            if self
                .top
                .compare_exchange(top, next, MARK_ORD, RELAXED, guard)
                .is_ok()
            {
                let val = top_ref.val;
                unsafe { guard.defer_destroy(top) };
                return Some(val);
            }
            std::hint::spin_loop();
        }
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

impl Drop for TreiberStack {
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
