//! Single-threaded contract tests, instantiated for every ordered-set
//! implementation.
//!
//! Covers the uniform interface: duplicate-rejecting inserts, deletes that
//! return the removed value, exact sizes in quiescence, the
//! insert/find/delete/find round trip, and empty-structure behavior.

mod common;

use intset::hashtable::{
    CowHashTable, JavaHashTable, LockedHashTable, OptikHashTable, ServerHashTable,
};
use intset::list::{HarrisList, LazyList, OptikList, PughList};
use intset::skiplist::{FraserSkipList, HerlihySkipList, OptikSkipList, PughSkipList, SeqSkipList};
use intset::{ConcurrentSet, SetConfig};

fn small_config() -> SetConfig {
    SetConfig {
        level_max: 8,
        capacity: 64,
        concurrency: 16,
        buckets: 16,
    }
}

/// Config degenerating every hash table to a single bucket; the contract
/// must survive the degenerate shape.
fn one_bucket_config() -> SetConfig {
    SetConfig {
        level_max: 8,
        capacity: 1,
        concurrency: 1,
        buckets: 1,
    }
}

fn contract_suite(make: &dyn Fn() -> Box<dyn ConcurrentSet>) {
    seeded_inserts(make());
    duplicate_insert_rejected(make());
    delete_returns_removed_value(make());
    round_trip(make());
    empty_structure(make());
    interleaved_inserts_and_deletes(make());
}

/// Three inserts, then lookups (scenario: fresh structure).
fn seeded_inserts(set: Box<dyn ConcurrentSet>) {
    assert!(set.insert(5, 50));
    assert!(set.insert(3, 30));
    assert!(set.insert(7, 70));
    assert_eq!(set.size(), 3);
    assert_eq!(set.find(3), Some(30));
    assert_eq!(set.find(5), Some(50));
    assert_eq!(set.find(7), Some(70));
    assert_eq!(set.find(4), None);
}

fn duplicate_insert_rejected(set: Box<dyn ConcurrentSet>) {
    assert!(set.insert(1, 10));
    assert!(!set.insert(1, 20));
    assert_eq!(set.size(), 1);
    assert_eq!(set.find(1), Some(10), "duplicate insert must not clobber");
}

fn delete_returns_removed_value(set: Box<dyn ConcurrentSet>) {
    set.insert(5, 50);
    set.insert(3, 30);
    set.insert(7, 70);
    assert_eq!(set.delete(5), Some(50));
    assert_eq!(set.size(), 2);
    assert_eq!(set.find(5), None);
    assert_eq!(set.find(3), Some(30));
    assert_eq!(set.find(7), Some(70));
    assert_eq!(set.delete(5), None, "second delete of the same key");
}

fn round_trip(set: Box<dyn ConcurrentSet>) {
    assert!(set.insert(11, 111));
    assert_eq!(set.find(11), Some(111));
    assert_eq!(set.delete(11), Some(111));
    assert_eq!(set.find(11), None);
}

fn empty_structure(set: Box<dyn ConcurrentSet>) {
    assert_eq!(set.size(), 0);
    assert_eq!(set.find(1), None);
    assert_eq!(set.delete(1), None);
}

fn interleaved_inserts_and_deletes(set: Box<dyn ConcurrentSet>) {
    for key in 1..=64 {
        assert!(set.insert(key, key * 10));
    }
    for key in (1..=64).step_by(2) {
        assert_eq!(set.delete(key), Some(key * 10));
    }
    assert_eq!(set.size(), 32);
    for key in 1..=64 {
        let expected = if key % 2 == 0 { Some(key * 10) } else { None };
        assert_eq!(set.find(key), expected, "key {key}");
    }
    // Deleted keys can come back with new values.
    for key in (1..=64).step_by(2) {
        assert!(set.insert(key, key * 100));
    }
    assert_eq!(set.size(), 64);
    assert_eq!(set.find(3), Some(300));
}

macro_rules! ordered_set_contract {
    ($module:ident, $make:expr) => {
        mod $module {
            use super::*;

            #[test]
            fn contract() {
                common::init_tracing();
                let make: &dyn Fn() -> Box<dyn ConcurrentSet> = &$make;
                contract_suite(make);
            }
        }
    };
}

ordered_set_contract!(harris_list, || Box::new(HarrisList::new()));
ordered_set_contract!(lazy_list, || Box::new(LazyList::new()));
ordered_set_contract!(optik_list, || Box::new(OptikList::new()));
ordered_set_contract!(pugh_list, || Box::new(PughList::new()));
ordered_set_contract!(fraser_skiplist, || Box::new(FraserSkipList::new(
    &small_config()
)));
ordered_set_contract!(herlihy_skiplist, || Box::new(HerlihySkipList::new(
    &small_config()
)));
ordered_set_contract!(optik_skiplist, || Box::new(OptikSkipList::new(
    &small_config()
)));
ordered_set_contract!(pugh_skiplist, || Box::new(PughSkipList::new(
    &small_config()
)));
ordered_set_contract!(seq_skiplist, || Box::new(SeqSkipList::new(&small_config())));
ordered_set_contract!(java_hashtable, || Box::new(JavaHashTable::new(
    &small_config()
)));
ordered_set_contract!(cow_hashtable, || Box::new(CowHashTable::new(
    &small_config()
)));
ordered_set_contract!(optik_hashtable, || Box::new(OptikHashTable::new(
    &small_config()
)));
ordered_set_contract!(locked_hashtable, || Box::new(LockedHashTable::new(
    &small_config()
)));
ordered_set_contract!(server_hashtable, || Box::new(ServerHashTable::new(
    &small_config()
)));

ordered_set_contract!(java_hashtable_one_bucket, || Box::new(JavaHashTable::new(
    &one_bucket_config()
)));
ordered_set_contract!(cow_hashtable_one_bucket, || Box::new(CowHashTable::new(
    &one_bucket_config()
)));
ordered_set_contract!(optik_hashtable_one_bucket, || Box::new(
    OptikHashTable::new(&one_bucket_config())
));
ordered_set_contract!(locked_hashtable_one_bucket, || Box::new(
    LockedHashTable::new(&one_bucket_config())
));
ordered_set_contract!(server_hashtable_one_bucket, || Box::new(
    ServerHashTable::new(&one_bucket_config())
));
