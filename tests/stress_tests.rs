//! Concurrent stress tests for every ordered-set implementation.
//!
//! Three families of checks:
//! - Mixed workload accounting: threads hammer a pre-populated set with a
//!   find/insert/delete mix; afterwards the size must equal
//!   `initial + successful inserts - successful deletes` exactly.
//! - Insert idempotence: many threads insert the same key; exactly one may
//!   win, and the surviving value is the winner's.
//! - Delete linearization: many threads delete the same key; exactly one
//!   may observe the value.
//!
//! The sequential skip list is exercised only by the single-threaded
//! contract tests; it makes no claims under concurrency.

mod common;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use intset::hashtable::{
    CowHashTable, JavaHashTable, LockedHashTable, OptikHashTable, ServerHashTable,
};
use intset::list::{HarrisList, LazyList, OptikList, PughList};
use intset::rng::Xorshift96;
use intset::skiplist::{FraserSkipList, HerlihySkipList, OptikSkipList, PughSkipList};
use intset::{ConcurrentSet, Key, SetConfig};

const THREADS: usize = 4;
const OPS_PER_THREAD: usize = 20_000;
const INITIAL: usize = 1024;
const RANGE: u32 = 2048;

fn stress_config() -> SetConfig {
    SetConfig {
        level_max: 10,
        capacity: INITIAL,
        concurrency: 64,
        buckets: 64,
    }
}

/// Mixed find/insert/delete run with exact final-size accounting.
fn mixed_workload_accounting(set: Arc<dyn ConcurrentSet>) {
    for key in (1..=INITIAL).rev() {
        set.insert(key as Key, 0);
    }
    assert_eq!(set.size(), INITIAL);

    let inserts = AtomicU64::new(0);
    let deletes = AtomicU64::new(0);
    thread::scope(|scope| {
        for t in 0..THREADS {
            let set = &set;
            let inserts = &inserts;
            let deletes = &deletes;
            scope.spawn(move || {
                let mut rng = Xorshift96::seeded(0xbeef + t as u64);
                let mut ins = 0u64;
                let mut del = 0u64;
                for _ in 0..OPS_PER_THREAD {
                    let op = rng.intn(100);
                    let key = Key::from(rng.intn(RANGE) + 1);
                    if op < 25 {
                        if set.insert(key, key) {
                            ins += 1;
                        }
                    } else if op < 50 {
                        if set.delete(key).is_some() {
                            del += 1;
                        }
                    } else {
                        set.find(key);
                    }
                }
                inserts.fetch_add(ins, Ordering::Relaxed);
                deletes.fetch_add(del, Ordering::Relaxed);
            });
        }
    });

    let expected = INITIAL as i64 + inserts.load(Ordering::Relaxed) as i64
        - deletes.load(Ordering::Relaxed) as i64;
    assert_eq!(
        set.size() as i64,
        expected,
        "final size does not match the success counters"
    );
}

/// Concurrent inserts of one key: at most one winner, and the value that
/// survives is the winner's.
fn same_key_insert_idempotence(set: Arc<dyn ConcurrentSet>) {
    const ATTEMPTS: usize = 50;
    for round in 0..ATTEMPTS {
        let key = (round + 1) as Key;
        let winners = AtomicU64::new(0);
        let winning_val = AtomicI64::new(-1);
        thread::scope(|scope| {
            for t in 0..8 {
                let set = &set;
                let winners = &winners;
                let winning_val = &winning_val;
                scope.spawn(move || {
                    let val = (t + 1) as i64 * 1000;
                    if set.insert(key, val) {
                        winners.fetch_add(1, Ordering::Relaxed);
                        winning_val.store(val, Ordering::Relaxed);
                    }
                });
            }
        });
        assert_eq!(winners.load(Ordering::Relaxed), 1, "key {key}");
        assert_eq!(
            set.find(key),
            Some(winning_val.load(Ordering::Relaxed)),
            "key {key}: surviving value must come from the winning insert"
        );
    }
}

/// Concurrent deletes of one key: exactly one observes the value.
fn same_key_delete_linearizes(set: Arc<dyn ConcurrentSet>) {
    const ATTEMPTS: usize = 50;
    for round in 0..ATTEMPTS {
        let key = (round + 1) as Key;
        assert!(set.insert(key, key * 7));
        let winners = AtomicU64::new(0);
        thread::scope(|scope| {
            for _ in 0..8 {
                let set = &set;
                let winners = &winners;
                scope.spawn(move || {
                    if let Some(val) = set.delete(key) {
                        assert_eq!(val, key * 7);
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });
        assert_eq!(winners.load(Ordering::Relaxed), 1, "key {key}");
        assert_eq!(set.find(key), None);
    }
}

macro_rules! stress_suite {
    ($module:ident, $make:expr) => {
        mod $module {
            use super::*;

            #[test]
            fn mixed_workload() {
                common::init_tracing();
                let make: &dyn Fn() -> Arc<dyn ConcurrentSet> = &$make;
                mixed_workload_accounting(make());
            }

            #[test]
            fn insert_idempotence() {
                let make: &dyn Fn() -> Arc<dyn ConcurrentSet> = &$make;
                same_key_insert_idempotence(make());
            }

            #[test]
            fn delete_linearization() {
                let make: &dyn Fn() -> Arc<dyn ConcurrentSet> = &$make;
                same_key_delete_linearizes(make());
            }
        }
    };
}

stress_suite!(harris_list, || Arc::new(HarrisList::new()));
stress_suite!(lazy_list, || Arc::new(LazyList::new()));
stress_suite!(optik_list, || Arc::new(OptikList::new()));
stress_suite!(pugh_list, || Arc::new(PughList::new()));
stress_suite!(fraser_skiplist, || Arc::new(FraserSkipList::new(
    &stress_config()
)));
stress_suite!(herlihy_skiplist, || Arc::new(HerlihySkipList::new(
    &stress_config()
)));
stress_suite!(optik_skiplist, || Arc::new(OptikSkipList::new(
    &stress_config()
)));
stress_suite!(pugh_skiplist, || Arc::new(PughSkipList::new(
    &stress_config()
)));
stress_suite!(java_hashtable, || Arc::new(JavaHashTable::new(
    &stress_config()
)));
stress_suite!(cow_hashtable, || Arc::new(CowHashTable::new(
    &stress_config()
)));
stress_suite!(optik_hashtable, || Arc::new(OptikHashTable::new(
    &stress_config()
)));
stress_suite!(locked_hashtable, || Arc::new(LockedHashTable::new(
    &stress_config()
)));
stress_suite!(server_hashtable, || Arc::new(ServerHashTable::new(
    &stress_config()
)));

/// Hash tables squeezed into a single bucket must still account exactly.
mod degenerate_single_bucket {
    use super::*;

    fn one_bucket() -> SetConfig {
        SetConfig {
            level_max: 10,
            capacity: 1,
            concurrency: 1,
            buckets: 1,
        }
    }

    #[test]
    fn java_hashtable_one_bucket_mixed_workload() {
        mixed_workload_accounting(Arc::new(JavaHashTable::new(&one_bucket())));
    }

    #[test]
    fn optik_hashtable_one_bucket_mixed_workload() {
        mixed_workload_accounting(Arc::new(OptikHashTable::new(&one_bucket())));
    }

    #[test]
    fn cow_hashtable_one_bucket_mixed_workload() {
        mixed_workload_accounting(Arc::new(CowHashTable::new(&one_bucket())));
    }
}
