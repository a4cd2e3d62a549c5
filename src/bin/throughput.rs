//! Mixed-workload throughput driver.
//!
//! Populates the chosen structure, hammers it from N threads for a fixed
//! window, prints the operation table, and asserts the final size against
//! the success counters. Exits nonzero on any violated invariant.
//!
//! ```bash
//! cargo run --release --bin throughput -- -t sl-fraser -n 8 -d 2000 -u 20 -p 10
//! ```

use std::process::ExitCode;

use intset::bench::{self, BenchArgs, USAGE};

fn main() -> ExitCode {
    intset::init_tracing();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.iter().any(|a| a == "-h" || a == "--help") {
        println!("usage: throughput [options]\n{USAGE}");
        println!("\nstructures: {}", bench::structure_names().join(", "));
        return ExitCode::SUCCESS;
    }

    let mut args = match BenchArgs::parse(raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("usage: throughput [options]\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let config = args.normalize();
    println!("## Structure: {}", args.structure);
    println!("## Initial: {} / Range: {}", args.initial, args.range);
    {
        let kb = args.initial as f64 * std::mem::size_of::<usize>() as f64 / 1024.0;
        println!("Sizeof initial: {:.2} KB = {:.2} MB", kb, kb / 1024.0);
    }

    let Some(set) = bench::build_set(&args.structure, &config) else {
        eprintln!("unknown structure: {}", args.structure);
        return ExitCode::FAILURE;
    };

    let result = bench::run_throughput(&set, &args);
    bench::report(&result, args.threads);

    ExitCode::SUCCESS
}
