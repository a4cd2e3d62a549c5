//! Per-operation latency driver.
//!
//! Same workload loop as the throughput driver, but every operation is
//! individually timed. The cost of the timer itself is estimated first
//! (repeated averaged back-to-back readings, with pauses between rounds)
//! and subtracted from the reported means.
//!
//! ```bash
//! cargo run --release --bin latency -- -t ll-harris -n 4 -d 2000
//! ```

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use intset::bench::{self, BenchArgs, USAGE};
use intset::key::Key;
use intset::rng::Xorshift96;

/// Measurements averaged per calibration round.
const CALIBRATE_AVGS: u32 = 200;
/// Calibration rounds; the smallest round wins.
const CALIBRATE_REPS: u32 = 5;
/// Pause between calibration rounds.
const CALIBRATE_PAUSE: Duration = Duration::from_millis(50);

/// Estimate the overhead of one timed measurement, in nanoseconds.
fn calibrate_overhead() -> u64 {
    let mut best = u64::MAX;
    for _ in 0..CALIBRATE_REPS {
        let mut total = 0u64;
        for _ in 0..CALIBRATE_AVGS {
            let start = Instant::now();
            let stop = Instant::now();
            total += stop.duration_since(start).as_nanos() as u64;
        }
        best = best.min(total / u64::from(CALIBRATE_AVGS));
        std::thread::sleep(CALIBRATE_PAUSE);
    }
    best
}

#[derive(Default)]
struct LatencyTotals {
    put_count: AtomicU64,
    put_ns: AtomicU64,
    get_count: AtomicU64,
    get_ns: AtomicU64,
    remove_count: AtomicU64,
    remove_ns: AtomicU64,
}

fn average_ns(count: u64, ns: u64, overhead: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        ((ns / count).saturating_sub(overhead)) as f64
    }
}

fn main() -> ExitCode {
    intset::init_tracing();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.iter().any(|a| a == "-h" || a == "--help") {
        println!("usage: latency [options]\n{USAGE}");
        println!("\nstructures: {}", bench::structure_names().join(", "));
        return ExitCode::SUCCESS;
    }

    let mut args = match BenchArgs::parse(raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("usage: latency [options]\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let config = args.normalize();
    println!("## Structure: {}", args.structure);
    println!("## Initial: {} / Range: {}", args.initial, args.range);

    let overhead = calibrate_overhead();
    println!("## Measurement overhead: {overhead} ns");

    let Some(set) = bench::build_set(&args.structure, &config) else {
        eprintln!("unknown structure: {}", args.structure);
        return ExitCode::FAILURE;
    };

    bench::populate(set.as_ref(), args.initial);

    let running = AtomicBool::new(false);
    let totals = LatencyTotals::default();
    let barrier = Barrier::new(args.threads + 1);
    let base_seed = args.seed.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x51_7c_c1_b7)
    });

    std::thread::scope(|scope| {
        for t in 0..args.threads {
            let set = Arc::clone(&set);
            let running = &running;
            let totals = &totals;
            let barrier = &barrier;
            let args = &args;
            scope.spawn(move || {
                let mut rng = Xorshift96::seeded(base_seed.wrapping_add(t as u64));
                let mut put = (0u64, 0u64);
                let mut get = (0u64, 0u64);
                let mut remove = (0u64, 0u64);
                barrier.wait();
                while running.load(Ordering::Relaxed) {
                    let op = rng.intn(100);
                    let key = Key::from(rng.intn(args.range as u32) + 1);
                    let start = Instant::now();
                    if op < args.put {
                        set.insert(key, 0);
                        put.0 += 1;
                        put.1 += start.elapsed().as_nanos() as u64;
                    } else if op < args.update {
                        set.delete(key);
                        remove.0 += 1;
                        remove.1 += start.elapsed().as_nanos() as u64;
                    } else {
                        set.find(key);
                        get.0 += 1;
                        get.1 += start.elapsed().as_nanos() as u64;
                    }
                }
                totals.put_count.fetch_add(put.0, Ordering::Relaxed);
                totals.put_ns.fetch_add(put.1, Ordering::Relaxed);
                totals.get_count.fetch_add(get.0, Ordering::Relaxed);
                totals.get_ns.fetch_add(get.1, Ordering::Relaxed);
                totals.remove_count.fetch_add(remove.0, Ordering::Relaxed);
                totals.remove_ns.fetch_add(remove.1, Ordering::Relaxed);
            });
        }

        println!("*** RUNNING ***");
        running.store(true, Ordering::SeqCst);
        barrier.wait();
        std::thread::sleep(Duration::from_millis(args.duration_ms));
        running.store(false, Ordering::SeqCst);
    });
    println!("*** STOPPED ***");

    let get_count = totals.get_count.load(Ordering::Relaxed);
    let put_count = totals.put_count.load(Ordering::Relaxed);
    let remove_count = totals.remove_count.load(Ordering::Relaxed);
    println!("    : {:<10} | {}", "count", "avg latency (ns)");
    println!(
        "srch: {:<10} | {:.0}",
        get_count,
        average_ns(get_count, totals.get_ns.load(Ordering::Relaxed), overhead)
    );
    println!(
        "insr: {:<10} | {:.0}",
        put_count,
        average_ns(put_count, totals.put_ns.load(Ordering::Relaxed), overhead)
    );
    println!(
        "rems: {:<10} | {:.0}",
        remove_count,
        average_ns(remove_count, totals.remove_ns.load(Ordering::Relaxed), overhead)
    );

    ExitCode::SUCCESS
}
