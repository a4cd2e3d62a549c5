//! Versioned optimistic lock.
//!
//! A single `u64` word: the least-significant bit is the *locked* flag, the
//! remaining 63 bits count versions. The all-ones value is a sentinel
//! marking the holder as *deleted*; once published it never changes again.
//!
//! # Concurrency model
//! 1. Readers snapshot the word with [`OptikLock::load`] while traversing,
//!    perform the read, and a writer later proves the snapshot is still
//!    current *atomically with lock acquisition*:
//!    [`OptikLock::try_lock_version`] CASes `snapshot -> snapshot + 1`,
//!    which both validates and locks in one step.
//! 2. [`OptikLock::unlock`] increments again, clearing the lock bit and
//!    publishing a new version in the same store.
//! 3. When a writer acquired several locks and a later acquisition fails,
//!    [`OptikLock::revert`] decrements an already-taken lock back to its
//!    pre-lock word, releasing it *without* bumping the version, so readers
//!    whose snapshots are still valid are not spuriously invalidated.
//!
//! This collapses the usual "optimistic read, validate, lock, re-validate"
//! dance into a single CAS.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(all(test, not(loom)))]
mod concurrent_tests;
#[cfg(all(test, loom))]
mod loom_tests;

/// Spin iterations between scheduler yields while waiting in `lock`.
const SPINS_BEFORE_YIELD: u32 = 1024;

const LOCK_BIT: u64 = 1;

/// Sentinel word of a deleted holder.
const DELETED: u64 = u64::MAX;

/// A point-in-time value of an [`OptikLock`] word.
///
/// `Copy` and deliberately opaque: a snapshot can only be produced by
/// [`OptikLock::load`] and consumed by the `try_lock_*` validators, so a
/// stale integer cannot masquerade as a live lock state. The default value
/// is the unlocked version-zero word.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot(u64);

impl Snapshot {
    /// Whether the lock bit was set when the snapshot was taken.
    #[inline]
    #[must_use]
    pub const fn is_locked(self) -> bool {
        self.0 & LOCK_BIT == LOCK_BIT
    }

    /// Whether the holder was deleted when the snapshot was taken.
    #[inline]
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        self.0 == DELETED
    }

    /// Version counter (lock bit stripped).
    #[inline]
    #[must_use]
    pub const fn version(self) -> u64 {
        self.0 >> 1
    }
}

/// Versioned optimistic lock word.
#[derive(Debug, Default)]
pub struct OptikLock {
    word: AtomicU64,
}

impl OptikLock {
    /// New unlocked lock at version zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    /// Snapshot the current word.
    #[inline]
    #[must_use]
    pub fn load(&self) -> Snapshot {
        Snapshot(self.word.load(Ordering::Acquire))
    }

    /// Whether the holder has been deleted.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.load().is_deleted()
    }

    /// Validate `expected` and acquire in one CAS.
    ///
    /// Succeeds iff the word still equals the (unlocked) snapshot; on
    /// success the word is `expected + 1`: locked, same version.
    #[inline]
    pub fn try_lock_version(&self, expected: Snapshot) -> bool {
        if expected.is_locked() || self.word.load(Ordering::Relaxed) != expected.0 {
            return false;
        }
        self.word
            .compare_exchange(
                expected.0,
                expected.0 + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Validate `expected` and publish the deleted sentinel in one CAS.
    ///
    /// The winner owns the (now permanently locked) holder.
    #[inline]
    pub fn try_lock_delete(&self, expected: Snapshot) -> bool {
        if expected.is_locked() || self.word.load(Ordering::Relaxed) != expected.0 {
            return false;
        }
        self.word
            .compare_exchange(expected.0, DELETED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquire at whatever the current version is; single CAS attempt.
    #[inline]
    pub fn try_lock(&self) -> bool {
        let cur = Snapshot(self.word.load(Ordering::Relaxed));
        if cur.is_locked() {
            return false;
        }
        self.word
            .compare_exchange(cur.0, cur.0 + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Spin until acquired, yielding periodically under contention.
    pub fn lock(&self) {
        let mut spins: u32 = 0;
        loop {
            let cur = loop {
                let word = self.word.load(Ordering::Relaxed);
                if word & LOCK_BIT == 0 {
                    break word;
                }
                std::hint::spin_loop();
                spins = spins.wrapping_add(1);
                if spins % SPINS_BEFORE_YIELD == 0 {
                    std::thread::yield_now();
                }
            };
            if self
                .word
                .compare_exchange(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Release, bumping the version. Caller must hold the lock.
    #[inline]
    pub fn unlock(&self) {
        self.word.fetch_add(1, Ordering::Release);
    }

    /// Release *without* publishing a new version. Caller must hold the
    /// lock and must not have mutated the protected state.
    #[inline]
    pub fn revert(&self) {
        self.word.fetch_sub(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unlocked_version_zero() {
        let lock = OptikLock::new();
        let snap = lock.load();
        assert!(!snap.is_locked());
        assert!(!snap.is_deleted());
        assert_eq!(snap.version(), 0);
    }

    #[test]
    fn unlock_bumps_version() {
        let lock = OptikLock::new();
        let before = lock.load();
        lock.lock();
        assert!(lock.load().is_locked());
        lock.unlock();
        let after = lock.load();
        assert!(!after.is_locked());
        assert_eq!(after.version(), before.version() + 1);
    }

    #[test]
    fn try_lock_version_validates_snapshot() {
        let lock = OptikLock::new();
        let snap = lock.load();

        // A committed write in between invalidates the snapshot.
        lock.lock();
        lock.unlock();
        assert!(!lock.try_lock_version(snap));

        // A fresh snapshot succeeds.
        let snap = lock.load();
        assert!(lock.try_lock_version(snap));
        assert!(lock.load().is_locked());
        lock.unlock();
    }

    #[test]
    fn try_lock_version_rejects_locked_snapshot() {
        let lock = OptikLock::new();
        lock.lock();
        let snap = lock.load();
        assert!(snap.is_locked());
        assert!(!lock.try_lock_version(snap));
        lock.unlock();
    }

    #[test]
    fn revert_restores_snapshot_validity() {
        let lock = OptikLock::new();
        let snap = lock.load();

        assert!(lock.try_lock_version(snap));
        lock.revert();

        // The version did not move, so the original snapshot still commits.
        assert!(lock.try_lock_version(snap));
        lock.unlock();
    }

    #[test]
    fn try_lock_delete_is_terminal() {
        let lock = OptikLock::new();
        let snap = lock.load();
        assert!(lock.try_lock_delete(snap));
        assert!(lock.is_deleted());

        // Nothing succeeds against a deleted word.
        let dead = lock.load();
        assert!(dead.is_locked());
        assert!(!lock.try_lock_version(dead));
        assert!(!lock.try_lock(), "deleted word must never be re-acquired");
    }

    #[test]
    fn try_lock_delete_loses_to_committed_writer() {
        let lock = OptikLock::new();
        let snap = lock.load();
        lock.lock();
        lock.unlock();
        assert!(!lock.try_lock_delete(snap));
        assert!(!lock.is_deleted());
    }
}
