//! Criterion microbenchmarks comparing the set implementations on the
//! operations the big harness measures, at a scale criterion can handle.
//!
//! Run with: `cargo bench --bench sets`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use intset::bench::{build_set, structure_names};
use intset::rng::Xorshift96;
use intset::{ConcurrentSet, Key, SetConfig};

const INITIAL: usize = 1024;
const RANGE: u32 = 2048;

fn bench_config() -> SetConfig {
    SetConfig {
        level_max: 10,
        capacity: INITIAL,
        concurrency: 64,
        buckets: 64,
    }
}

fn populated(name: &str) -> Arc<dyn ConcurrentSet> {
    let set = build_set(name, &bench_config()).expect("registered structure");
    for key in (1..=INITIAL).rev() {
        set.insert(key as Key, 0);
    }
    set
}

/// Ordered sets only; queues and stacks have no meaningful find.
fn searchable() -> Vec<&'static str> {
    structure_names()
        .into_iter()
        .filter(|name| intset::bench::find_is_def(name) == Some(true))
        .collect()
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");
    for name in searchable() {
        let set = populated(name);
        let mut rng = Xorshift96::seeded(42);
        group.bench_function(name, |b| {
            b.iter(|| {
                let key = Key::from(rng.intn(RANGE) + 1);
                black_box(set.find(black_box(key)))
            });
        });
    }
    group.finish();
}

fn bench_insert_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_delete");
    for name in searchable() {
        let set = populated(name);
        let mut rng = Xorshift96::seeded(42);
        group.bench_function(name, |b| {
            b.iter(|| {
                let key = Key::from(rng.intn(RANGE) + 1);
                if !set.insert(key, key) {
                    black_box(set.delete(key));
                }
            });
        });
    }
    group.finish();
}

fn bench_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_20pct_update");
    for name in searchable() {
        let set = populated(name);
        let mut rng = Xorshift96::seeded(42);
        group.bench_function(name, |b| {
            b.iter(|| {
                let op = rng.intn(100);
                let key = Key::from(rng.intn(RANGE) + 1);
                if op < 10 {
                    black_box(set.insert(key, 0));
                } else if op < 20 {
                    black_box(set.delete(key));
                } else {
                    black_box(set.find(key));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_find, bench_insert_delete, bench_mixed);
criterion_main!(benches);
