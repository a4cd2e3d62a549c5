//! Multi-threaded tests for the versioned optimistic lock.
//!
//! These are probabilistic: they hammer the word from several threads and
//! check the algebraic outcomes (exactly one delete winner, no lost updates
//! under `try_lock_version` commit loops). Deterministic interleaving
//! coverage lives in `loom_tests`.

use super::OptikLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn version_commit_loop_loses_no_updates() {
    const THREADS: usize = 8;
    const COMMITS: usize = 5_000;

    let lock = Arc::new(OptikLock::new());
    let counter = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                let mut done = 0;
                while done < COMMITS {
                    let snap = lock.load();
                    if snap.is_locked() || !lock.try_lock_version(snap) {
                        std::hint::spin_loop();
                        continue;
                    }
                    // Inside the critical section: plain read-modify-write.
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                    lock.unlock();
                    done += 1;
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(counter.load(Ordering::Relaxed), (THREADS * COMMITS) as u64);
    // Every commit bumped the version exactly twice (lock + unlock).
    assert_eq!(lock.load().version(), (THREADS * COMMITS) as u64);
}

#[test]
fn exactly_one_delete_winner() {
    const THREADS: usize = 16;

    for _ in 0..100 {
        let lock = Arc::new(OptikLock::new());
        let wins = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    let snap = lock.load();
                    if lock.try_lock_delete(snap) {
                        wins.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::Relaxed), 1);
        assert!(lock.is_deleted());
    }
}

#[test]
fn blocking_lock_excludes_validating_lock() {
    const ROUNDS: usize = 2_000;

    let lock = Arc::new(OptikLock::new());

    let blocker = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            for _ in 0..ROUNDS {
                lock.lock();
                lock.unlock();
            }
        })
    };

    let validator = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let mut commits = 0;
            while commits < ROUNDS {
                let snap = lock.load();
                if !snap.is_locked() && lock.try_lock_version(snap) {
                    lock.unlock();
                    commits += 1;
                }
            }
        })
    };

    blocker.join().unwrap();
    validator.join().unwrap();

    let final_snap = lock.load();
    assert!(!final_snap.is_locked());
    assert_eq!(final_snap.version(), 2 * ROUNDS as u64);
}
