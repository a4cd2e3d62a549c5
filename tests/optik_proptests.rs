//! Property-based tests for the versioned optimistic lock.
//!
//! The lock word is a tiny algebra: versions only grow through
//! lock/unlock pairs, `revert` undoes an acquisition exactly, stale
//! snapshots never commit, and the deleted sentinel absorbs everything.
//! These properties are checked over arbitrary operation sequences.

use intset::optik::OptikLock;
use proptest::prelude::*;

/// Operations a single thread can drive a lock through.
#[derive(Debug, Clone)]
enum Op {
    /// Acquire (blocking) then release, committing a version bump.
    Commit,
    /// Acquire with the current snapshot, then revert.
    AcquireRevert,
    /// Try committing with a snapshot taken `staleness` commits ago.
    TryStale { staleness: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Commit),
        Just(Op::AcquireRevert),
        (0usize..4).prop_map(|staleness| Op::TryStale { staleness }),
    ]
}

proptest! {
    /// The version counter counts exactly the committed writes, whatever
    /// the interleaving of reverts and stale attempts.
    #[test]
    fn version_counts_commits(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let lock = OptikLock::new();
        let mut commits: u64 = 0;
        let mut history = vec![lock.load()];

        for op in ops {
            match op {
                Op::Commit => {
                    lock.lock();
                    lock.unlock();
                    commits += 1;
                    history.push(lock.load());
                }
                Op::AcquireRevert => {
                    let snap = lock.load();
                    prop_assert!(lock.try_lock_version(snap));
                    lock.revert();
                    // No commit: the snapshot must still be valid, which we
                    // prove by committing through it and reverting again.
                    prop_assert!(lock.try_lock_version(snap));
                    lock.revert();
                }
                Op::TryStale { staleness } => {
                    if history.len() > staleness + 1 {
                        let stale = history[history.len() - 2 - staleness];
                        prop_assert!(
                            !lock.try_lock_version(stale),
                            "a snapshot from before a commit must not validate"
                        );
                    }
                }
            }
        }

        let final_snap = lock.load();
        prop_assert!(!final_snap.is_locked());
        prop_assert_eq!(final_snap.version(), commits);
    }

    /// A fresh snapshot always commits; a snapshot from before any commit
    /// never does.
    #[test]
    fn fresh_snapshots_commit(commits_before in 0u64..50) {
        let lock = OptikLock::new();
        let stale = lock.load();
        for _ in 0..commits_before {
            lock.lock();
            lock.unlock();
        }
        let fresh = lock.load();
        if commits_before == 0 {
            prop_assert_eq!(stale, fresh);
        } else {
            prop_assert!(!lock.try_lock_version(stale));
        }
        prop_assert!(lock.try_lock_version(fresh));
        lock.unlock();
    }

    /// Once deleted, every acquisition path is dead.
    #[test]
    fn deleted_is_absorbing(commits_before in 0u64..20) {
        let lock = OptikLock::new();
        for _ in 0..commits_before {
            lock.lock();
            lock.unlock();
        }
        let snap = lock.load();
        prop_assert!(lock.try_lock_delete(snap));
        prop_assert!(lock.is_deleted());

        let dead = lock.load();
        prop_assert!(dead.is_deleted());
        prop_assert!(dead.is_locked(), "the sentinel reads as locked");
        prop_assert!(!lock.try_lock_version(dead));
        prop_assert!(!lock.try_lock_delete(dead));
        prop_assert!(!lock.try_lock());
    }

    /// Delete validates its snapshot like any other commit.
    #[test]
    fn delete_rejects_stale_snapshot(commits_after in 1u64..20) {
        let lock = OptikLock::new();
        let stale = lock.load();
        for _ in 0..commits_after {
            lock.lock();
            lock.unlock();
        }
        prop_assert!(!lock.try_lock_delete(stale));
        prop_assert!(!lock.is_deleted());
    }
}
