//! Michael-Scott lock-free queue.
//!
//! M. Michael, M. Scott, "Simple, Fast, and Practical Non-Blocking and
//! Blocking Concurrent Queue Algorithms", PODC 1996.
//!
//! `head` always points at a dummy node; the live entries sit between
//! `head.next` and `tail`, and `tail` lags at most one node behind the
//! true last node. Both enqueue and dequeue help a lagging tail forward,
//! which also guarantees `head` never overtakes `tail` - the dequeuer may
//! therefore retire the outgoing dummy without leaving a dangling `tail`.

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;

use crate::key::{Key, Val};
use crate::ordering::{MARK_ORD, READ_ORD, RELAXED};
use crate::set::ConcurrentSet;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
}

/// Lock-free FIFO queue.
pub struct MsQueue {
    head: CachePadded<Atomic<Node>>,
    tail: CachePadded<Atomic<Node>>,
}

impl Default for MsQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MsQueue {
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
            head: CachePadded::new(Atomic::from(dummy)),
            tail: CachePadded::new(Atomic::from(dummy)),
        }
    }
}

impl ConcurrentSet for MsQueue {
    fn find(&self, _key: Key) -> Option<Val> {
        // Queues have no meaningful lookup; presence is trivially true.
        Some(0)
    }

    fn insert(&self, key: Key, val: Val) -> bool {
        let guard = &epoch::pin();
        let mut node = Owned::new(Node {
            key,
            val,
            next: Atomic::null(),
        });
        let (published, tail) = loop {
            let tail = self.tail.load(READ_ORD, guard);
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(READ_ORD, guard);
            if tail == self.tail.load(READ_ORD, guard) {
                if next.is_null() {
                    match tail_ref.next.compare_exchange(
                        Shared::null(),
                        node,
                        MARK_ORD,
                        RELAXED,
                        guard,
                    ) {
                        Ok(published) => break (published, tail),
                        Err(e) => node = e.new,
                    }
                } else {
                    // Help a lagging tail forward.
                    let _ = self
                        .tail
                        .compare_exchange(tail, next, MARK_ORD, RELAXED, guard);
                }
            }
            std::hint::spin_loop();
        };
        let _ = self
            .tail
            .compare_exchange(tail, published, MARK_ORD, RELAXED, guard);
        true
    }

    /// Dequeue the head entry; the key argument is ignored.
    fn delete(&self, _key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        loop {
            let head = self.head.load(READ_ORD, guard);
            let tail = self.tail.load(READ_ORD, guard);
            let next = unsafe { head.deref() }.next.load(READ_ORD, guard);
            if head == self.head.load(READ_ORD, guard) {
                if head == tail {
                    if next.is_null() {
                        return None;
                    }
                    let _ = self
                        .tail
                        .compare_exchange(tail, next, MARK_ORD, RELAXED, guard);
                } else if self
                    .head
                    .compare_exchange(head, next, MARK_ORD, RELAXED, guard)
                    .is_ok()
                {
                    let val = unsafe { next.deref() }.val;
                    unsafe { guard.defer_destroy(head) };
                    return Some(val);
                }
            }
            std::hint::spin_loop();
        }
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

impl Drop for MsQueue {
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
