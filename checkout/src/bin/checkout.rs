//! Checkout simulation runner.
//!
//! Runs shoppers and one cashier against a shared bounded belt and prints
//! every queue event.
//!
//! # Usage
//!
//! ```sh
//! checkout --capacity 4 --shoppers 2 --items 4
//! checkout --capacity 1 --shoppers 3 --items 1 --journal run.bin
//! checkout --shopper-pace-ms 300 --cashier-pace-ms 500
//! checkout --baseline --pace-ms 300
//! ```

use std::path::PathBuf;
use std::time::Duration;

use checkout::baseline::run_baseline;
use checkout::event::{Actor, EventKind, Journal, Observer, QueueEvent};
use checkout::runtime::{ConfigError, MAX_ITEMS, RunError, SimulationConfig, run};

/// Poll interval of the unsynchronized cashier.
const BASELINE_POLL: Duration = Duration::from_millis(50);

/// Parsed command line.
struct Options {
    config: SimulationConfig,
    journal: Option<PathBuf>,
    baseline: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("failed to write journal: {0}")]
    Journal(#[from] checkout::event::JournalError),
}

fn main() {
    if let Err(e) = run_cli() {
        eprintln!("checkout: {e}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<(), CliError> {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;
    checkout::init_tracing();

    let config = &options.config;
    println!(
        "checkout: capacity={} shoppers={} items={:?}{}",
        config.capacity,
        config.shoppers.len(),
        config.shoppers,
        if options.baseline { " (unsynchronized)" } else { "" }
    );

    if options.baseline {
        let report = run_baseline(config, BASELINE_POLL)?;
        println!(
            "checkout: baseline accepted={} rejected={} consumed={} lost={:?} duplicated={:?} empty_polls={}",
            report.accepted.len(),
            report.rejected.len(),
            report.consumed.len(),
            report.lost(),
            report.duplicated(),
            report.empty_polls
        );
        return Ok(());
    }

    let journal = Journal::new();
    let printer = |event: &QueueEvent| {
        print_event(event);
        journal.on_event(event);
    };
    let report = run(config, &printer)?;

    println!(
        "checkout: complete, produced={} consumed={} peak_size={}",
        report.total_produced(),
        report.total_consumed(),
        report.peak_size
    );

    if let Some(path) = &options.journal {
        journal.write_to(path)?;
        println!("checkout: journal of {} events written to {}", journal.len(), path.display());
    }

    Ok(())
}

fn print_event(event: &QueueEvent) {
    match (event.actor, event.kind) {
        (Actor::Shopper(id), EventKind::Enqueued) => println!(
            "Shopper {id}: added item {} (queue size: {}, front={}, rear={})",
            event.item, event.size, event.head, event.tail
        ),
        (Actor::Cashier, EventKind::Dequeued) => println!(
            "Cashier: processed item {} (ticket: {}, queue size: {}, front={}, rear={})",
            event.item, event.ticket, event.size, event.head, event.tail
        ),
        (actor, kind) => println!("{actor}: {kind:?} item {}", event.item),
    }
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, ConfigError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue {
            flag: flag.to_string(),
        })
}

fn parse_pacing(value: &str, flag: &str) -> Result<Option<Duration>, ConfigError> {
    let ms: u64 = parse_number(value, flag)?;
    Ok((ms > 0).then(|| Duration::from_millis(ms)))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

/// Parses command line arguments into run options.
fn parse_args(args: &[String]) -> Result<Options, ConfigError> {
    let defaults = SimulationConfig::default();
    let mut capacity = defaults.capacity;
    let mut shoppers = defaults.shoppers.len();
    let mut items = defaults.shoppers.first().copied().unwrap_or(0);
    let mut shopper_pacing = None;
    let mut cashier_pacing = None;
    let mut journal = None;
    let mut baseline = false;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--capacity" | "-c" => capacity = parse_number(next_value(args, &mut i, flag)?, flag)?,
            "--shoppers" | "-s" => shoppers = parse_number(next_value(args, &mut i, flag)?, flag)?,
            "--items" | "-n" => items = parse_number(next_value(args, &mut i, flag)?, flag)?,
            "--pace-ms" | "-p" => {
                let pacing = parse_pacing(next_value(args, &mut i, flag)?, flag)?;
                shopper_pacing = pacing;
                cashier_pacing = pacing;
            }
            "--shopper-pace-ms" => {
                shopper_pacing = parse_pacing(next_value(args, &mut i, flag)?, flag)?;
            }
            "--cashier-pace-ms" => {
                cashier_pacing = parse_pacing(next_value(args, &mut i, flag)?, flag)?;
            }
            "--journal" | "-j" => journal = Some(PathBuf::from(next_value(args, &mut i, flag)?)),
            "--baseline" => baseline = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => return Err(ConfigError::UnknownArgument(arg.to_string())),
        }
        i += 1;
    }

    let mut config = SimulationConfig::uniform(capacity, shoppers, items);
    config.shopper_pacing = shopper_pacing;
    config.cashier_pacing = cashier_pacing;
    config.validate()?;

    Ok(Options {
        config,
        journal,
        baseline,
    })
}

fn print_usage() {
    eprintln!(
        r#"checkout - bounded-queue shopper/cashier simulation

USAGE:
    checkout [OPTIONS]

OPTIONS:
    -c, --capacity <N>      Belt capacity (default: 4)
    -s, --shoppers <N>      Number of shopper threads (default: 2)
    -n, --items <N>         Items per shopper, at most {MAX_ITEMS} (default: 4)
    -p, --pace-ms <MS>      Pause after each item, both sides (default: 0)
        --shopper-pace-ms <MS>
                            Pause after each item a shopper places
        --cashier-pace-ms <MS>
                            Pause after each item the cashier rings up
    -j, --journal <PATH>    Write a binary event journal to PATH
        --baseline          Run the unsynchronized variant instead
    -h, --help              Print this help message

ENVIRONMENT:
    RUST_LOG                Log filter when built with --features tracing

EXAMPLE:
    checkout --capacity 1 --shoppers 3 --items 1
"#
    );
}
