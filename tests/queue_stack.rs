//! FIFO/LIFO laws for the queues and stacks, and the ascending-drain law
//! for the priority queue.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use intset::pqueue::LotanShavitQueue;
use intset::queue::{MsLockQueue, MsQueue, OptikLfQueue, OptikQueue};
use intset::stack::{LockStack, TreiberStack};
use intset::{ConcurrentSet, SetConfig};

fn fifo_law(queue: &dyn ConcurrentSet) {
    assert_eq!(queue.delete(0), None, "dequeue on empty");
    assert!(queue.insert(1, 10));
    assert!(queue.insert(2, 20));
    assert!(queue.insert(3, 30));
    assert_eq!(queue.size(), 3);
    assert_eq!(queue.delete(0), Some(10));
    assert_eq!(queue.delete(0), Some(20));
    assert_eq!(queue.delete(0), Some(30));
    assert_eq!(queue.delete(0), None, "drained queue is empty");
    assert_eq!(queue.size(), 0);
    assert!(!queue.find_is_def());
}

fn lifo_law(stack: &dyn ConcurrentSet) {
    assert_eq!(stack.delete(0), None, "pop on empty");
    assert!(stack.insert(1, 10));
    assert!(stack.insert(2, 20));
    assert!(stack.insert(3, 30));
    assert_eq!(stack.size(), 3);
    assert_eq!(stack.delete(0), Some(30));
    assert_eq!(stack.delete(0), Some(20));
    assert_eq!(stack.delete(0), Some(10));
    assert_eq!(stack.delete(0), None, "drained stack is empty");
    assert!(!stack.find_is_def());
}

#[test]
fn ms_queue_is_fifo() {
    common::init_tracing();
    fifo_law(&MsQueue::new());
}

#[test]
fn ms_lock_queue_is_fifo() {
    fifo_law(&MsLockQueue::new());
}

#[test]
fn optik_queue_is_fifo() {
    fifo_law(&OptikQueue::new());
}

#[test]
fn optik_lf_queue_is_fifo() {
    fifo_law(&OptikLfQueue::new());
}

#[test]
fn treiber_stack_is_lifo() {
    lifo_law(&TreiberStack::new());
}

#[test]
fn lock_stack_is_lifo() {
    lifo_law(&LockStack::new());
}

#[test]
fn priority_queue_drains_ascending() {
    let config = SetConfig {
        level_max: 8,
        ..SetConfig::default()
    };
    let pq = LotanShavitQueue::new(&config);
    assert_eq!(pq.delete(0), None);
    for key in [500, 2, 77, 300, 9, 41] {
        assert!(pq.insert(key, key));
    }
    let mut drained = Vec::new();
    while let Some(val) = pq.delete(0) {
        drained.push(val);
    }
    assert_eq!(drained, vec![2, 9, 41, 77, 300, 500]);
}

/// Producers and consumers running together must neither lose nor invent
/// entries.
fn mpmc_conservation(queue: Arc<dyn ConcurrentSet>) {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: i64 = 5_000;

    let mut handles = Vec::new();
    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            let base = p as i64 * PER_PRODUCER;
            for i in 0..PER_PRODUCER {
                assert!(queue.insert(base + i, base + i));
            }
        }));
    }
    let mut consumed: Vec<thread::JoinHandle<Vec<i64>>> = Vec::new();
    for _ in 0..CONSUMERS {
        let queue = Arc::clone(&queue);
        consumed.push(thread::spawn(move || {
            let mut seen = Vec::new();
            let mut dry = 0;
            // Keep draining until the queue stays empty for a while after
            // the producers are plausibly done.
            while dry < 1_000 {
                match queue.delete(0) {
                    Some(val) => {
                        seen.push(val);
                        dry = 0;
                    }
                    None => {
                        dry += 1;
                        std::thread::yield_now();
                    }
                }
            }
            seen
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    let mut all: Vec<i64> = Vec::new();
    for handle in consumed {
        all.extend(handle.join().unwrap());
    }
    // Whatever is left after the consumers gave up.
    while let Some(val) = queue.delete(0) {
        all.push(val);
    }

    assert_eq!(all.len(), PRODUCERS * PER_PRODUCER as usize, "lost or duplicated entries");
    let unique: HashSet<i64> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len(), "duplicated entries");
    assert_eq!(queue.size(), 0);
}

#[test]
fn ms_queue_mpmc_conservation() {
    mpmc_conservation(Arc::new(MsQueue::new()));
}

#[test]
fn optik_lf_queue_mpmc_conservation() {
    mpmc_conservation(Arc::new(OptikLfQueue::new()));
}

#[test]
fn treiber_stack_mpmc_conservation() {
    mpmc_conservation(Arc::new(TreiberStack::new()));
}

#[test]
fn lock_queue_mpmc_conservation() {
    mpmc_conservation(Arc::new(MsLockQueue::new()));
}
