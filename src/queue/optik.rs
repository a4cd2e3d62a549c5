//! Michael-Scott queues with an optimistic dequeue.
//!
//! Both variants replace the dequeue-side mutex with a versioned lock on
//! the head: a dequeuer snapshots the head version, checks emptiness
//! without any lock at all, and commits the head advance with one
//! validating CAS. [`OptikQueue`] keeps the locked enqueue of the two-lock
//! queue; [`OptikLfQueue`] pairs the optimistic dequeue with the lock-free
//! enqueue.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::CachePadded;

use crate::key::{Key, Val};
use crate::optik::OptikLock;
use crate::ordering::{MARK_ORD, READ_ORD, RELAXED, WRITE_ORD};
use crate::set::ConcurrentSet;

struct Node {
    key: Key,
    val: Val,
    next: Atomic<Node>,
}

fn new_dummy<'g>(guard: &'g Guard) -> Shared<'g, Node> {
    Owned::new(Node {
        key: 0,
        val: 0,
        next: Atomic::null(),
    })
    .into_shared(guard)
}

fn queue_size(head: &Atomic<Node>) -> usize {
    let guard = &epoch::pin();
    let mut node = head.load(READ_ORD, guard);
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

fn drop_chain(head: &Atomic<Node>) {
    unsafe {
        let guard = epoch::unprotected();
        let mut node = head.load(RELAXED, guard);
        while !node.is_null() {
            let next = node.deref().next.load(RELAXED, guard);
            drop(node.into_owned());
            node = next;
        }
    }
}

/// FIFO queue: locked enqueue, optimistic dequeue.
pub struct OptikQueue {
    head: CachePadded<Atomic<Node>>,
    tail: CachePadded<Atomic<Node>>,
    head_lock: OptikLock,
    tail_lock: OptikLock,
}

impl Default for OptikQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OptikQueue {
    /// Empty queue holding one dummy node.
    #[must_use]
    pub fn new() -> Self {
        let guard = &epoch::pin();
        let dummy = new_dummy(guard);
        Self {
            head: CachePadded::new(Atomic::from(dummy)),
            tail: CachePadded::new(Atomic::from(dummy)),
            head_lock: OptikLock::new(),
            tail_lock: OptikLock::new(),
        }
    }
}

impl ConcurrentSet for OptikQueue {
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
        self.tail_lock.lock();
        let tail = self.tail.load(READ_ORD, guard);
        unsafe { tail.deref() }.next.store(node, WRITE_ORD);
        self.tail.store(node, WRITE_ORD);
        self.tail_lock.unlock();
        true
    }

    /// Dequeue the head entry; the key argument is ignored.
    fn delete(&self, _key: Key) -> Option<Val> {
        let guard = &epoch::pin();
        loop {
            let version = self.head_lock.load();
            let head = self.head.load(READ_ORD, guard);
            let next = unsafe { head.deref() }.next.load(READ_ORD, guard);
            // The empty check needs no lock: the snapshot certifies it.
            let Some(next_ref) = (unsafe { next.as_ref() }) else {
                return None;
            };
            if !self.head_lock.try_lock_version(version) {
                std::thread::yield_now();
                continue;
            }
            self.head.store(next, WRITE_ORD);
            self.head_lock.unlock();
            unsafe { guard.defer_destroy(head) };
            return Some(next_ref.val);
        }
    }

    fn size(&self) -> usize {
        queue_size(&self.head)
    }

    fn find_is_def(&self) -> bool {
        false
    }
}

impl Drop for OptikQueue {
    fn drop(&mut self) {
        drop_chain(&self.head);
    }
}

/// FIFO queue: lock-free enqueue, optimistic dequeue.
pub struct OptikLfQueue {
    head: CachePadded<Atomic<Node>>,
    tail: CachePadded<Atomic<Node>>,
    head_lock: OptikLock,
}

impl Default for OptikLfQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OptikLfQueue {
    /// Empty queue holding one dummy node.
    #[must_use]
    pub fn new() -> Self {
        let guard = &epoch::pin();
        let dummy = new_dummy(guard);
        Self {
            head: CachePadded::new(Atomic::from(dummy)),
            tail: CachePadded::new(Atomic::from(dummy)),
            head_lock: OptikLock::new(),
        }
    }
}

impl ConcurrentSet for OptikLfQueue {
    fn find(&self, _key: Key) -> Option<Val> {
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
            let version = self.head_lock.load();
            let head = self.head.load(READ_ORD, guard);
            let next = unsafe { head.deref() }.next.load(READ_ORD, guard);
            let Some(next_ref) = (unsafe { next.as_ref() }) else {
                return None;
            };
            if !self.head_lock.try_lock_version(version) {
                std::thread::yield_now();
                continue;
            }
            // The lock-free enqueue can leave the tail one node behind;
            // push it past the outgoing dummy before retiring it, or the
            // tail would point into freed memory.
            let tail = self.tail.load(READ_ORD, guard);
            if tail == head {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, MARK_ORD, RELAXED, guard);
            }
            self.head.store(next, WRITE_ORD);
            self.head_lock.unlock();
            unsafe { guard.defer_destroy(head) };
            return Some(next_ref.val);
        }
    }

    fn size(&self) -> usize {
        queue_size(&self.head)
    }

    fn find_is_def(&self) -> bool {
        false
    }
}

impl Drop for OptikLfQueue {
    fn drop(&mut self) {
        drop_chain(&self.head);
    }
}
