//! Loom tests for the versioned optimistic lock.
//!
//! Loom explores all interleavings of a small number of threads, catching
//! races that stochastic testing misses.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib optik::loom_tests`
//!
//! NOTE: loom requires its own atomic types, so the word protocol is
//! restated here on `loom::sync::atomic::AtomicU64`. The constants and CAS
//! shapes mirror the main module exactly.

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;

const LOCK_BIT: u64 = 1;
const DELETED: u64 = u64::MAX;

struct LoomOptik {
    word: AtomicU64,
}

impl LoomOptik {
    fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    fn load(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    fn try_lock_version(&self, expected: u64) -> bool {
        if expected & LOCK_BIT != 0 {
            return false;
        }
        self.word
            .compare_exchange(expected, expected + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    fn try_lock_delete(&self, expected: u64) -> bool {
        if expected & LOCK_BIT != 0 {
            return false;
        }
        self.word
            .compare_exchange(expected, DELETED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    fn unlock(&self) {
        self.word.fetch_add(1, Ordering::Release);
    }

    fn revert(&self) {
        self.word.fetch_sub(1, Ordering::Release);
    }
}

/// Two snapshot-validating writers: at most one commits per version.
#[test]
fn loom_single_committer_per_version() {
    loom::model(|| {
        let lock = Arc::new(LoomOptik::new());
        let committed = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let committed = Arc::clone(&committed);
                thread::spawn(move || {
                    let snap = lock.load();
                    if lock.try_lock_version(snap) {
                        committed.fetch_add(1, Ordering::Relaxed);
                        lock.unlock();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let commits = committed.load(Ordering::Relaxed);
        let word = lock.load();
        // Each commit contributes exactly two increments.
        assert_eq!(word, 2 * commits);
    });
}

/// Delete against a concurrent version-writer: never both succeed from the
/// same snapshot, and a successful delete is permanent.
#[test]
fn loom_delete_vs_writer() {
    loom::model(|| {
        let lock = Arc::new(LoomOptik::new());

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let snap = lock.load();
                if lock.try_lock_version(snap) {
                    lock.unlock();
                    true
                } else {
                    false
                }
            })
        };

        let deleter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let snap = lock.load();
                lock.try_lock_delete(snap)
            })
        };

        let wrote = writer.join().unwrap();
        let deleted = deleter.join().unwrap();

        let word = lock.load();
        if deleted {
            assert_eq!(word, DELETED);
        } else {
            assert!(wrote, "if the delete lost, the writer must have won");
        }
    });
}

/// Revert releases without moving the version, so the loser's snapshot
/// stays committable.
#[test]
fn loom_revert_preserves_snapshot() {
    loom::model(|| {
        let lock = Arc::new(LoomOptik::new());
        let snap = lock.load();
        assert!(lock.try_lock_version(snap));
        lock.revert();

        let t = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let snap = lock.load();
                lock.try_lock_version(snap)
            })
        };
        assert!(t.join().unwrap());
    });
}
