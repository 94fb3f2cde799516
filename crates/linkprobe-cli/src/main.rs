//! linkprobe: find the fastest, longest and quickest settings a serial link
//! handles reliably.
//!
//! Usage:
//!   linkprobe list
//!   linkprobe round --baud 115200 --length 64 /dev/ttyUSB0 /dev/ttyUSB1
//!   linkprobe run /dev/ttyUSB0 /dev/ttyUSB1
//!   linkprobe --simulate run A B

mod logging;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use linkprobe_core::link::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};
use linkprobe_core::prelude::*;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Run against an in-memory bus instead of real ports
    #[arg(long, global = true)]
    simulate: bool,

    /// Highest baud rate the simulated bus carries without corruption
    #[arg(long, global = true, default_value_t = 115_200)]
    sim_max_baud: u32,

    /// Longest payload the simulated bus carries without corruption
    #[arg(long, global = true, default_value_t = 4096)]
    sim_max_length: usize,

    /// Per-read timeout in milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Seed for payloads, for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    List,

    /// Run a single transmission round
    Round {
        #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
        baud: u32,
        #[arg(long, default_value_t = 10)]
        length: usize,
        #[arg(required = true)]
        ports: Vec<String>,
    },

    /// Find the highest working baud rate
    Speed {
        /// Payload length used at every candidate
        #[arg(long, default_value_t = 2000)]
        length: usize,
        #[arg(long, default_value_t = 9600)]
        min: u32,
        #[arg(long, default_value_t = 120_000_000)]
        max: u32,
        #[arg(required = true)]
        ports: Vec<String>,
    },

    /// Find the longest working payload at a baud rate
    Length {
        #[arg(long, default_value_t = 9600)]
        baud: u32,
        #[arg(long, default_value_t = 100)]
        min: u32,
        #[arg(long, default_value_t = 100_000)]
        max: u32,
        #[arg(required = true)]
        ports: Vec<String>,
    },

    /// Measure round-trip delay at fixed settings
    Delay {
        #[arg(long, default_value_t = 9600)]
        baud: u32,
        #[arg(long, default_value_t = 10)]
        length: usize,
        /// Number of rounds to pool
        #[arg(long, default_value_t = 10)]
        samples: usize,
        #[arg(required = true)]
        ports: Vec<String>,
    },

    /// Speed, then length, then delays
    Run {
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(required = true)]
        ports: Vec<String>,
    },
}

/// Overrides for the default characterisation plan
#[derive(Args, Debug, Default)]
struct PlanArgs {
    /// Lowest baud rate tried [default: 9600]
    #[arg(long)]
    min_baud: Option<u32>,
    /// Speed search ceiling, exclusive [default: 120000000]
    #[arg(long)]
    max_baud: Option<u32>,
    /// Payload length while searching for speed [default: 2000]
    #[arg(long)]
    speed_length: Option<usize>,
    /// Shortest payload tried [default: 100]
    #[arg(long)]
    min_length: Option<u32>,
    /// Length search ceiling, exclusive [default: 100000]
    #[arg(long)]
    max_length: Option<u32>,
    /// Rounds per delay measurement [default: 10]
    #[arg(long)]
    samples: Option<usize>,
    /// Short payload length delays are measured at [default: 10]
    #[arg(long)]
    short_length: Option<usize>,
}

impl PlanArgs {
    fn plan(&self) -> SearchPlan {
        let default = SearchPlan::default();
        SearchPlan {
            min_baud: self.min_baud.unwrap_or(default.min_baud),
            max_baud: self.max_baud.unwrap_or(default.max_baud),
            speed_search_length: self.speed_length.unwrap_or(default.speed_search_length),
            min_length: self.min_length.unwrap_or(default.min_length),
            max_length: self.max_length.unwrap_or(default.max_length),
            delay_samples: self.samples.unwrap_or(default.delay_samples),
            short_length: self.short_length.unwrap_or(default.short_length),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let sim = SimTransport::with_seed(cli.seed.unwrap_or_default())
        .reliable_up_to_baud(cli.sim_max_baud)
        .reliable_up_to_length(cli.sim_max_length);
    let transport: &dyn Transport = if cli.simulate { &sim } else { &SerialTransport };

    let config = LinkConfig::default().with_read_timeout(Duration::from_millis(cli.timeout_ms));
    let generator = cli
        .seed
        .map(PayloadGenerator::from_seed)
        .unwrap_or_default();
    let prober = |ports: Vec<String>| {
        Prober::new(transport, ports)
            .with_config(config.clone())
            .with_generator(generator)
    };

    match cli.command {
        Command::List => list(cli.json),
        Command::Round {
            baud,
            length,
            ports,
        } => {
            let outcome = prober(ports)
                .probe(baud, length)
                .with_context(|| format!("round at {baud} baud, length {length}"))?;
            print_round(&outcome, cli.json)
        }
        Command::Speed {
            length,
            min,
            max,
            ports,
        } => {
            let report = prober(ports).search_speed(min, max, length);
            print_search("speed", "baud", &report, cli.json)
        }
        Command::Length {
            baud,
            min,
            max,
            ports,
        } => {
            let report = prober(ports).search_length(min, max, baud);
            print_search("length", "characters", &report, cli.json)
        }
        Command::Delay {
            baud,
            length,
            samples,
            ports,
        } => {
            let stats = prober(ports)
                .sample_delay(baud, length, samples)
                .with_context(|| format!("delay at {baud} baud, length {length}"))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_delay(length, &stats);
            }
            Ok(())
        }
        Command::Run { plan, ports } => {
            let report = prober(ports).characterize(&plan.plan())?;
            print_report(&report, cli.json)
        }
    }
}

fn list(json: bool) -> Result<()> {
    let ports = list_ports();
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  {:04x}:{:04x}  {}",
                port.name,
                vid,
                pid,
                port.product.unwrap_or_default()
            ),
            _ => println!("{}", port.name),
        }
    }
    Ok(())
}

fn ms(d: Duration) -> String {
    format!("{:.3}ms", d.as_secs_f64() * 1000.0)
}

fn print_round(outcome: &RoundOutcome, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "passed": outcome.passed(),
            "receipts": outcome.receipts(),
            "failure": outcome.failure().map(|f| f.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    for receipt in outcome.receipts() {
        println!(
            "RX OK {} -> {}, delay: {}",
            receipt.sender,
            receipt.receiver,
            ms(receipt.delay)
        );
    }
    match outcome.failure() {
        Some(failure) => println!("Round failed ({}): {failure}", failure.kind()),
        None => println!("Round passed"),
    }
    Ok(())
}

fn print_search(what: &str, unit: &str, report: &SearchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("Last known working {what}: {} {unit}", report.last_good);
    match report.last_attempted {
        Some(candidate) if candidate != report.last_good => {
            println!("Test failed at: {candidate} {unit}")
        }
        Some(_) => {}
        None => println!("No candidate tried"),
    }
    if let Termination::Aborted(reason) = &report.termination {
        println!("Search aborted: {reason}");
    }
    Ok(())
}

fn print_delay(length: usize, stats: &DelayStats) {
    println!("Delay for packet length {length} ({} samples):", stats.samples);
    println!("  Minimum delay: {}", ms(stats.min));
    println!("  Average delay: {}", ms(stats.mean));
    println!("  Maximum delay: {}", ms(stats.max));
}

fn print_report(report: &LinkReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    info!(endpoints = ?report.endpoints, "characterisation finished");
    println!("Last known working speed: {} baud", report.max_baud());
    println!("Last known working length: {} characters", report.max_length());
    for delay in &report.delays {
        match &delay.stats {
            Some(stats) => print_delay(delay.length, stats),
            None => println!("No delay samples for packet length {}", delay.length),
        }
    }
    Ok(())
}
