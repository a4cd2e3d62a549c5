//! Benchmark harness: workload parameters, the structure registry, and the
//! mixed read/update driver the whole suite is measured with.
//!
//! The driver populates a structure, spawns workers that each draw
//! operations by weighted coin and keys uniformly from `[1, range]`, runs
//! for a fixed window, then checks the books: the final size must equal
//! `initial + successful inserts - successful deletes`, or the process
//! aborts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use crate::config::SetConfig;
use crate::hashtable::{CowHashTable, JavaHashTable, LockedHashTable, OptikHashTable, ServerHashTable};
use crate::key::Key;
use crate::list::{HarrisList, LazyList, OptikList, PughList};
use crate::pqueue::LotanShavitQueue;
use crate::queue::{MsLockQueue, MsQueue, OptikLfQueue, OptikQueue};
use crate::rng::Xorshift96;
use crate::set::ConcurrentSet;
use crate::skiplist::{FraserSkipList, HerlihySkipList, OptikSkipList, PughSkipList, SeqSkipList};
use crate::stack::{LockStack, TreiberStack};

/// Registered structures: name, whether `find` is meaningful, constructor.
type Constructor = fn(&SetConfig) -> Arc<dyn ConcurrentSet>;

const REGISTRY: &[(&str, bool, Constructor)] = &[
    ("ll-harris", true, |_| Arc::new(HarrisList::new())),
    ("ll-lazy", true, |_| Arc::new(LazyList::new())),
    ("ll-optik", true, |_| Arc::new(OptikList::new())),
    ("ll-pugh", true, |_| Arc::new(PughList::new())),
    ("sl-fraser", true, |c| Arc::new(FraserSkipList::new(c))),
    ("sl-herlihy", true, |c| Arc::new(HerlihySkipList::new(c))),
    ("sl-optik", true, |c| Arc::new(OptikSkipList::new(c))),
    ("sl-pugh", true, |c| Arc::new(PughSkipList::new(c))),
    ("sl-seq", true, |c| Arc::new(SeqSkipList::new(c))),
    ("ht-java", true, |c| Arc::new(JavaHashTable::new(c))),
    ("ht-cow", true, |c| Arc::new(CowHashTable::new(c))),
    ("ht-optik", true, |c| Arc::new(OptikHashTable::new(c))),
    ("ht-locked", true, |c| Arc::new(LockedHashTable::new(c))),
    ("ht-server", true, |c| Arc::new(ServerHashTable::new(c))),
    ("pq-lotan-shavit", true, |c| Arc::new(LotanShavitQueue::new(c))),
    ("q-ms-lf", false, |_| Arc::new(MsQueue::new())),
    ("q-ms-lb", false, |_| Arc::new(MsLockQueue::new())),
    ("q-optik", false, |_| Arc::new(OptikQueue::new())),
    ("q-optik-lf", false, |_| Arc::new(OptikLfQueue::new())),
    ("stack-treiber", false, |_| Arc::new(TreiberStack::new())),
    ("stack-lock", false, |_| Arc::new(LockStack::new())),
];

/// Names of every registered structure, in registry order.
#[must_use]
pub fn structure_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|&(name, _, _)| name).collect()
}

/// Whether `find` is meaningful for the named structure.
#[must_use]
pub fn find_is_def(name: &str) -> Option<bool> {
    REGISTRY
        .iter()
        .find(|&&(n, _, _)| n == name)
        .map(|&(_, def, _)| def)
}

/// Construct the named structure.
#[must_use]
pub fn build_set(name: &str, config: &SetConfig) -> Option<Arc<dyn ConcurrentSet>> {
    REGISTRY
        .iter()
        .find(|&&(n, _, _)| n == name)
        .map(|&(_, _, build)| build(config))
}

/// Workload parameters, before and after normalization.
#[derive(Debug, Clone)]
pub struct BenchArgs {
    /// Test window in milliseconds.
    pub duration_ms: u64,
    /// Keys inserted before the window opens.
    pub initial: usize,
    /// Worker thread count.
    pub threads: usize,
    /// Keys are drawn from `[1, range]`.
    pub range: usize,
    /// Percentage of operations that are updates.
    pub update: u32,
    /// Percentage of operations that are inserts (the rest of the update
    /// share are deletes).
    pub put: u32,
    /// Hash-table load factor; scales the segmented table's capacity.
    pub load_factor: usize,
    /// Segment count for the segmented hash table.
    pub concurrency: usize,
    /// Bucket count for the non-segmented hash tables.
    pub buckets: usize,
    /// Structure under test.
    pub structure: String,
    /// Base PRNG seed; wall clock when absent.
    pub seed: Option<u64>,
}

impl Default for BenchArgs {
    fn default() -> Self {
        Self {
            duration_ms: 1000,
            initial: 1024,
            threads: 1,
            range: 2048,
            update: 20,
            put: 10,
            load_factor: 1,
            concurrency: 512,
            buckets: 64,
            structure: "sl-fraser".to_string(),
            seed: None,
        }
    }
}

/// Usage text for the benchmark binaries.
pub const USAGE: &str = "\
options:
  -t NAME   structure under test (see list below)
  -d MS     test duration in milliseconds (default 1000)
  -i N      number of elements inserted before the test (default 1024)
  -n N      number of threads (default 1)
  -r N      range of keys inserted in the set (default 2048)
  -u PCT    percentage of update transactions (default 20)
  -p PCT    percentage of put transactions, at most the update rate (default 10)
  -c N      load factor for the hash table (default 1)
  -l N      concurrency level for the hash table (default 512)
  -b N      number of buckets for the hash table (default 64)
  -s SEED   base PRNG seed (default: wall clock)";

impl BenchArgs {
    /// Parse command-line flags; `args` excludes the program name.
    ///
    /// # Errors
    /// Returns a description of the first malformed flag.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut out = Self::default();
        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| format!("flag {flag} expects a value"))
            };
            match flag.as_str() {
                "-t" => out.structure = value("-t")?,
                "-d" => out.duration_ms = parse_num(&value("-d")?, "-d")?,
                "-i" => out.initial = parse_num(&value("-i")?, "-i")?,
                "-n" => out.threads = parse_num(&value("-n")?, "-n")?,
                "-r" => out.range = parse_num(&value("-r")?, "-r")?,
                "-u" => out.update = parse_num(&value("-u")?, "-u")?,
                "-p" => out.put = parse_num(&value("-p")?, "-p")?,
                "-c" => out.load_factor = parse_num(&value("-c")?, "-c")?,
                "-l" => out.concurrency = parse_num(&value("-l")?, "-l")?,
                "-b" => out.buckets = parse_num(&value("-b")?, "-b")?,
                "-s" => out.seed = Some(parse_num(&value("-s")?, "-s")?),
                other => return Err(format!("unknown flag: {other}")),
            }
        }
        Ok(out)
    }

    /// Apply the workload normalization rules and derive the structure
    /// configuration. Prints a notice for every adjusted parameter.
    ///
    /// # Panics
    /// Panics on parameters that cannot be normalized (zero threads, an
    /// update rate above 100, or an unknown structure).
    pub fn normalize(&mut self) -> SetConfig {
        assert!(self.threads > 0, "thread count must be positive");
        let find_def = match find_is_def(&self.structure) {
            Some(def) => def,
            None => panic!(
                "unknown structure {:?}; available: {}",
                self.structure,
                structure_names().join(", ")
            ),
        };

        if find_def {
            assert!(
                self.update <= 100,
                "update rate is a percentage, at most 100"
            );
            if self.put > self.update {
                println!(
                    "** limiting put rate to update rate: old: {} / new: {}",
                    self.put, self.update
                );
                self.put = self.update;
            }
        } else {
            // Queues and stacks: every operation is an update; rescale the
            // put share to the full window.
            assert!(
                self.update != 0,
                "update rate must be nonzero for a structure without lookups"
            );
            if self.put > 100 {
                println!("** limiting put rate to update rate: old: {} / new: 100", self.put);
                self.put = 100;
            } else {
                self.put = self.put * 100 / self.update;
            }
            self.update = 100;
        }

        if !self.initial.is_power_of_two() {
            let rounded = self.initial.next_power_of_two();
            println!(
                "** rounding up initial (to make it power of 2): old: {} / new: {}",
                self.initial, rounded
            );
            self.initial = rounded;
        }
        if self.range < self.initial {
            self.range = 2 * self.initial;
        }
        if !self.range.is_power_of_two() {
            let rounded = self.range.next_power_of_two();
            println!(
                "** rounding up range (to make it power of 2): old: {} / new: {}",
                self.range, rounded
            );
            self.range = rounded;
        }
        if !self.concurrency.is_power_of_two() {
            let rounded = self.concurrency.next_power_of_two();
            println!(
                "** rounding up concurrency (to make it power of 2): old: {} / new: {}",
                self.concurrency, rounded
            );
            self.concurrency = rounded;
        }
        if !self.buckets.is_power_of_two() {
            let rounded = self.buckets.next_power_of_two();
            println!(
                "** rounding up buckets (to make it power of 2): old: {} / new: {}",
                self.buckets, rounded
            );
            self.buckets = rounded;
        }

        SetConfig {
            level_max: log2(self.initial).max(1),
            capacity: self.initial / self.load_factor.max(1),
            concurrency: self.concurrency,
            buckets: self.buckets,
        }
    }

    fn base_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9e37_79b9)
        })
    }
}

fn parse_num<T: std::str::FromStr>(s: &str, flag: &str) -> Result<T, String> {
    s.parse()
        .map_err(|_| format!("flag {flag}: invalid number {s:?}"))
}

fn log2(mut x: usize) -> usize {
    let mut y = 0;
    while x > 1 {
        x >>= 1;
        y += 1;
    }
    y
}

/// Per-thread operation counters.
#[derive(Debug, Default, Clone)]
pub struct ThreadStats {
    pub putting_count: u64,
    pub putting_count_succ: u64,
    pub getting_count: u64,
    pub getting_count_succ: u64,
    pub removing_count: u64,
    pub removing_count_succ: u64,
}

/// Merged counters plus the measured window.
#[derive(Debug, Default)]
pub struct BenchResult {
    pub putting_total: u64,
    pub putting_total_succ: u64,
    pub getting_total: u64,
    pub getting_total_succ: u64,
    pub removing_total: u64,
    pub removing_total_succ: u64,
    /// Wall-clock duration of the measured window, in milliseconds.
    pub actual_duration_ms: f64,
}

impl BenchResult {
    /// All operations, attempted.
    #[must_use]
    pub fn total_ops(&self) -> u64 {
        self.putting_total + self.getting_total + self.removing_total
    }

    /// Operations per second over the measured window.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        self.total_ops() as f64 * 1000.0 / self.actual_duration_ms
    }
}

#[derive(Default)]
struct Totals {
    putting: AtomicU64,
    putting_succ: AtomicU64,
    getting: AtomicU64,
    getting_succ: AtomicU64,
    removing: AtomicU64,
    removing_succ: AtomicU64,
}

impl Totals {
    fn merge(&self, stats: &ThreadStats) {
        self.putting.fetch_add(stats.putting_count, Ordering::Relaxed);
        self.putting_succ
            .fetch_add(stats.putting_count_succ, Ordering::Relaxed);
        self.getting.fetch_add(stats.getting_count, Ordering::Relaxed);
        self.getting_succ
            .fetch_add(stats.getting_count_succ, Ordering::Relaxed);
        self.removing
            .fetch_add(stats.removing_count, Ordering::Relaxed);
        self.removing_succ
            .fetch_add(stats.removing_count_succ, Ordering::Relaxed);
    }
}

/// Insert keys `initial..=1` (descending) and check the books.
///
/// # Panics
/// Panics when the populated size disagrees with `initial`.
pub fn populate(set: &dyn ConcurrentSet, initial: usize) {
    print!("Adding {initial} entries to set...");
    for key in (1..=initial).rev() {
        set.insert(key as Key, 0);
    }
    println!(" done.");
    let size = set.size();
    assert!(
        size == initial,
        "single-threaded set initialization failed: set size = {size}, expected {initial}"
    );
}

/// One worker's operation loop.
fn worker_loop(
    set: &dyn ConcurrentSet,
    running: &AtomicBool,
    rng: &mut Xorshift96,
    range: usize,
    update: u32,
    put: u32,
    stats: &mut ThreadStats,
) {
    while running.load(Ordering::Relaxed) {
        let op = rng.intn(100);
        let key = Key::from(rng.intn(range as u32) + 1);
        if op < put {
            if set.insert(key, 0) {
                stats.putting_count_succ += 1;
            }
            stats.putting_count += 1;
        } else if op < update {
            if set.delete(key).is_some() {
                stats.removing_count_succ += 1;
            }
            stats.removing_count += 1;
        } else {
            if set.find(key).is_some() {
                stats.getting_count_succ += 1;
            }
            stats.getting_count += 1;
        }
    }
}

/// Run the mixed workload against `set` with already-normalized `args`.
///
/// # Panics
/// Panics when the final size disagrees with the success counters.
pub fn run_throughput(set: &Arc<dyn ConcurrentSet>, args: &BenchArgs) -> BenchResult {
    populate(set.as_ref(), args.initial);

    let running = AtomicBool::new(false);
    let totals = Totals::default();
    let barrier = Barrier::new(args.threads + 1);
    let base_seed = args.base_seed();

    let mut actual_duration_ms = 0.0;
    std::thread::scope(|scope| {
        print!("Creating threads: ");
        for t in 0..args.threads {
            if t == 0 {
                print!("{t}");
            } else {
                print!(", {t}");
            }
            let set = Arc::clone(set);
            let running = &running;
            let totals = &totals;
            let barrier = &barrier;
            scope.spawn(move || {
                let mut rng = Xorshift96::seeded(base_seed.wrapping_add(t as u64));
                let mut stats = ThreadStats::default();
                barrier.wait();
                worker_loop(
                    set.as_ref(),
                    running,
                    &mut rng,
                    args.range,
                    args.update,
                    args.put,
                    &mut stats,
                );
                totals.merge(&stats);
            });
        }
        println!();

        println!("*** RUNNING ***");
        running.store(true, Ordering::SeqCst);
        let start = Instant::now();
        barrier.wait();
        std::thread::sleep(Duration::from_millis(args.duration_ms));
        running.store(false, Ordering::SeqCst);
        actual_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        // Scope joins the workers, which publish their stats first.
    });
    println!("*** STOPPED ***");

    let result = BenchResult {
        putting_total: totals.putting.load(Ordering::Relaxed),
        putting_total_succ: totals.putting_succ.load(Ordering::Relaxed),
        getting_total: totals.getting.load(Ordering::Relaxed),
        getting_total_succ: totals.getting_succ.load(Ordering::Relaxed),
        removing_total: totals.removing.load(Ordering::Relaxed),
        removing_total_succ: totals.removing_succ.load(Ordering::Relaxed),
        actual_duration_ms,
    };

    let size = set.size();
    let expected = (args.initial as i64 + result.putting_total_succ as i64
        - result.removing_total_succ as i64) as usize;
    assert!(
        size == expected,
        "WRONG set size: {size} instead of {expected}"
    );

    result
}

/// Success rate in percent; zero when nothing was attempted.
fn succ_rate(total: u64, succ: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (1.0 - (total - succ) as f64 / total as f64) * 100.0
    }
}

/// Share of all operations in percent.
fn share(total_ops: u64, count: u64) -> f64 {
    if total_ops == 0 {
        0.0
    } else {
        100.0 * (1.0 - (total_ops - count) as f64 / total_ops as f64)
    }
}

/// Print the operation table, throughput, and Mops, in the suite's usual
/// shape.
pub fn report(result: &BenchResult, threads: usize) {
    let total = result.total_ops();
    let get_succ = succ_rate(result.getting_total, result.getting_total_succ);
    let get_share = share(total, result.getting_total);
    let put_succ = succ_rate(result.putting_total, result.putting_total_succ);
    let put_share = share(total, result.putting_total);
    let rem_succ = succ_rate(result.removing_total, result.removing_total_succ);
    let rem_share = share(total, result.removing_total);

    println!(
        "    : {:<10} | {:<10} | {:<11} | {:<11} | {}",
        "total", "success", "succ %", "total %", "effective %"
    );
    println!(
        "srch: {:<10} | {:<10} | {:>10.1}% | {:>10.1}% | ",
        result.getting_total, result.getting_total_succ, get_succ, get_share
    );
    println!(
        "insr: {:<10} | {:<10} | {:>10.1}% | {:>10.1}% | {:>10.1}%",
        result.putting_total,
        result.putting_total_succ,
        put_succ,
        put_share,
        put_share * put_succ / 100.0
    );
    println!(
        "rems: {:<10} | {:<10} | {:>10.1}% | {:>10.1}% | {:>10.1}%",
        result.removing_total,
        result.removing_total_succ,
        rem_succ,
        rem_share,
        rem_share * rem_succ / 100.0
    );
    println!("#txs {threads}\t({:<10.0}", result.throughput());
    println!("#Mops {:.3}", result.throughput() / 1e6);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let args = BenchArgs::parse(
            ["-t", "ll-lazy", "-d", "250", "-n", "4", "-u", "40", "-p", "15", "-s", "7"]
                .into_iter()
                .map(String::from),
        )
        .unwrap();
        assert_eq!(args.structure, "ll-lazy");
        assert_eq!(args.duration_ms, 250);
        assert_eq!(args.threads, 4);
        assert_eq!(args.update, 40);
        assert_eq!(args.put, 15);
        assert_eq!(args.seed, Some(7));
    }

    #[test]
    fn parse_rejects_unknown_flag() {
        assert!(BenchArgs::parse(["-z".to_string()]).is_err());
        assert!(BenchArgs::parse(["-d".to_string()]).is_err());
        assert!(BenchArgs::parse(["-d".to_string(), "abc".to_string()]).is_err());
    }

    #[test]
    fn normalize_rounds_to_powers_of_two() {
        let mut args = BenchArgs {
            initial: 1000,
            range: 1500,
            concurrency: 300,
            ..BenchArgs::default()
        };
        let config = args.normalize();
        assert_eq!(args.initial, 1024);
        assert_eq!(args.range, 2048);
        assert_eq!(args.concurrency, 512);
        assert_eq!(config.level_max, 10);
    }

    #[test]
    fn normalize_caps_put_by_update() {
        let mut args = BenchArgs {
            update: 20,
            put: 50,
            ..BenchArgs::default()
        };
        args.normalize();
        assert_eq!(args.put, 20);
    }

    #[test]
    fn normalize_rescales_update_only_structures() {
        let mut args = BenchArgs {
            structure: "q-ms-lf".to_string(),
            update: 50,
            put: 25,
            ..BenchArgs::default()
        };
        args.normalize();
        assert_eq!(args.update, 100);
        assert_eq!(args.put, 50);
    }

    #[test]
    fn registry_knows_every_structure() {
        for name in structure_names() {
            let mut args = BenchArgs {
                structure: name.to_string(),
                initial: 64,
                range: 128,
                concurrency: 16,
                buckets: 16,
                ..BenchArgs::default()
            };
            let config = args.normalize();
            assert!(build_set(name, &config).is_some(), "missing builder: {name}");
        }
    }
}
