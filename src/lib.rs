//! # intset
//!
//! A suite of concurrent ordered-set, queue, and stack implementations over
//! signed 64-bit integer keys and values, plus the benchmark harness that
//! drives them under mixed read/update workloads.
//!
//! Every structure exposes the same four operations (`find`, `insert`,
//! `delete`, `size`) through the [`ConcurrentSet`] trait, so distinct points
//! in the concurrent-algorithm design space can be compared on identical
//! workloads:
//!
//! - **Linked lists**: Harris lock-free, lazy (Heller et al.), optimistic
//!   version-validated, Pugh fine-grained.
//! - **Skip lists**: Fraser lock-free, Herlihy optimistic lock-based,
//!   optimistic version-validated, Pugh, and a sequential baseline.
//! - **Hash tables**: segmented with per-segment rehash, copy-on-write array
//!   buckets, one sorted list per bucket, one server thread per bucket, and
//!   a plain mutex-per-bucket baseline.
//! - **Queues**: Michael-Scott lock-free and lock-based, plus two variants
//!   with a version-validated optimistic dequeue.
//! - **Stacks**: Treiber lock-free and lock-based.
//! - **Priority queue**: Lotan-Shavit skip-list based.
//!
//! ## Concurrency model
//!
//! Readers pin an epoch ([`crossbeam_epoch`]) for the duration of one
//! operation; the thread that makes a node unreachable retires it to the
//! current epoch. Logical deletion is carried either by the low tag bit of a
//! `next` pointer, by a `marked` flag, or by the deleted sentinel of the
//! versioned [`optik`] lock, depending on the algorithm.

pub mod bench;
pub mod config;
pub mod hashtable;
pub mod key;
pub mod list;
pub mod optik;
pub mod ordering;
pub mod pqueue;
pub mod queue;
pub mod rng;
pub mod set;
pub mod skiplist;
pub mod stack;
pub mod ttas;

pub(crate) mod tracing_helpers;

pub use config::SetConfig;
pub use key::{Key, Val, KEY_MAX, KEY_MIN};
pub use set::ConcurrentSet;

/// Install a global tracing subscriber reading `RUST_LOG`.
///
/// No-op unless the crate is built with the `tracing` feature. Safe to call
/// more than once; only the first call takes effect.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .with_target(true)
        .compact()
        .try_init();
}

/// Install a global tracing subscriber reading `RUST_LOG`.
///
/// No-op unless the crate is built with the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub fn init_tracing() {}
