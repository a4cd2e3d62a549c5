//! Skip-list sets.
//!
//! Five algorithms over tower nodes (key, value, per-level forward
//! pointers):
//!
//! - [`fraser::FraserSkipList`]: lock-free, tag-bit marking on every level,
//!   helping searches (K. Fraser, "Practical Lock Freedom", 2003).
//! - [`herlihy::HerlihySkipList`]: optimistic search, per-node spinlock with
//!   `marked`/`fully_linked` flags (Herlihy et al., SIROCCO 2007).
//! - [`optik::OptikSkipList`]: per-node versioned lock; searches record
//!   predecessor versions and commits validate them in one CAS.
//! - [`pugh::PughSkipList`]: per-node lock, hand-over-hand level locking,
//!   deleted nodes redirect their forward pointers at their predecessor.
//! - [`seq::SeqSkipList`]: unsynchronized baseline for measurement.
//!
//! Tower heights are geometric with p = 1/2, capped by the per-structure
//! `level_max` from [`SetConfig`](crate::SetConfig).

use std::cell::RefCell;

use crate::rng::Xorshift96;

pub mod fraser;
pub mod herlihy;
pub mod optik;
pub mod pugh;
pub mod seq;

pub use fraser::FraserSkipList;
pub use herlihy::HerlihySkipList;
pub use optik::OptikSkipList;
pub use pugh::PughSkipList;
pub use seq::SeqSkipList;

thread_local! {
    static LEVEL_RNG: RefCell<Xorshift96> = RefCell::new(Xorshift96::from_entropy());
}

/// Draw a tower height in `1..=level_max`, geometric with p = 1/2.
pub(crate) fn random_level(level_max: usize) -> usize {
    LEVEL_RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        let mut level = 1;
        while level < level_max && rng.intn(100) < 50 {
            level += 1;
        }
        level
    })
}

#[cfg(test)]
mod tests {
    use super::random_level;

    #[test]
    fn levels_respect_cap() {
        for _ in 0..10_000 {
            let level = random_level(8);
            assert!((1..=8).contains(&level));
        }
    }

    #[test]
    fn level_one_is_most_common() {
        let mut counts = [0usize; 9];
        for _ in 0..100_000 {
            counts[random_level(8)] += 1;
        }
        // p = 1/2 geometric: roughly half the draws stay at level one.
        assert!(counts[1] > counts[2]);
        assert!(counts[2] > counts[3]);
    }
}
