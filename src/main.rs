// src/main.rs - Cyclone29 command-line entry point
// Tree location: ./src/main.rs

//! Cyclone29 Main Entry Point
//!
//! Handles command-line arguments, selects the graph geometry, and runs
//! solve/bench loops with console reporting.

use chrono::Local;
use clap::{Parser, Subcommand};
use cyclone29::{
    config::SolverSettings,
    init,
    params::{CuckooParams, Cyclone19, Cyclone29, Cyclone8},
    solver::SolverCtx,
    trimmer::memory_estimate,
    Cyclone29Error, Result,
};
use std::time::Instant;

/// Header length the solver operates on, matching the mining protocol's
/// pre-nonce header layout.
const HEADER_LEN: usize = 80;

#[derive(Parser)]
#[command(name = "cyclone29")]
#[command(version)]
#[command(about = "CPU-parallel Cuckoo Cycle solver with bucketed edge trimming")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a nonce range for one header
    Solve {
        /// Graph geometry (c8, c19, c29)
        #[arg(short, long, default_value = "c29")]
        algorithm: String,
        /// Header bytes as hex (zero-padded/truncated to 80 bytes)
        #[arg(short = 'H', long, default_value = "")]
        header: String,
        /// Starting header nonce
        #[arg(short, long, default_value = "0")]
        nonce: u64,
        /// Number of nonces to attempt
        #[arg(short, long, default_value = "1")]
        range: u64,
        /// Trim rounds (0 = geometry default)
        #[arg(short = 'm', long, default_value = "0")]
        ntrims: u32,
        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,
        /// Backend index reported in stats
        #[arg(short, long, default_value = "0")]
        device: u32,
        /// Tag-relay rounds after trimming (0 = off)
        #[arg(long, default_value = "0")]
        relay_rounds: u32,
        /// Keep the driving thread hot
        #[arg(short, long)]
        cpuload: bool,
        /// Hash the header as-is instead of splicing the nonce into its
        /// last 4 bytes
        #[arg(long)]
        no_mutate_nonce: bool,
    },
    /// Time repeated solves
    Bench {
        /// Graph geometry (c8, c19, c29)
        #[arg(short, long, default_value = "c19")]
        algorithm: String,
        /// Solve iterations
        #[arg(short, long, default_value = "10")]
        iterations: u64,
        /// Trim rounds (0 = geometry default)
        #[arg(short = 'm', long, default_value = "0")]
        ntrims: u32,
        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,
    },
    /// Show default configuration
    Config,
    /// List graph geometries and memory requirements
    Info,
}

fn main() -> Result<()> {
    init()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Solve {
            algorithm,
            header,
            nonce,
            range,
            ntrims,
            threads,
            device,
            relay_rounds,
            cpuload,
            no_mutate_nonce,
        } => {
            let settings = SolverSettings {
                device,
                ntrims,
                threads,
                cpuload,
                mutate_nonce: !no_mutate_nonce,
                relay_rounds,
                ..SolverSettings::default()
            };
            let header = prepare_header(&header)?;
            match normalize(&algorithm)? {
                Geometry::C8 => solve_range::<Cyclone8>(settings, &header, nonce, range),
                Geometry::C19 => solve_range::<Cyclone19>(settings, &header, nonce, range),
                Geometry::C29 => solve_range::<Cyclone29>(settings, &header, nonce, range),
            }
        }
        Commands::Bench {
            algorithm,
            iterations,
            ntrims,
            threads,
        } => {
            let settings = SolverSettings {
                ntrims,
                threads,
                ..SolverSettings::default()
            };
            match normalize(&algorithm)? {
                Geometry::C8 => bench::<Cyclone8>(settings, iterations),
                Geometry::C19 => bench::<Cyclone19>(settings, iterations),
                Geometry::C29 => bench::<Cyclone29>(settings, iterations),
            }
        }
        Commands::Config => {
            let settings = cyclone29::default_params();
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Info => {
            print_info();
            Ok(())
        }
    }
}

/// Supported graph geometries.
enum Geometry {
    C8,
    C19,
    C29,
}

fn normalize(algorithm: &str) -> Result<Geometry> {
    match algorithm.to_ascii_lowercase().as_str() {
        "c8" | "cyclone8" => Ok(Geometry::C8),
        "c19" | "cyclone19" => Ok(Geometry::C19),
        "c29" | "cyclone29" => Ok(Geometry::C29),
        other => Err(Cyclone29Error::Settings(format!(
            "unknown algorithm '{}': expected c8, c19 or c29",
            other
        ))),
    }
}

/// Decode a hex header and normalize it to the 80-byte layout.
fn prepare_header(hex_header: &str) -> Result<Vec<u8>> {
    let mut header = if hex_header.is_empty() {
        Vec::new()
    } else {
        hex::decode(hex_header)?
    };
    header.resize(HEADER_LEN, 0);
    Ok(header)
}

fn solve_range<P: CuckooParams>(
    settings: SolverSettings,
    header: &[u8],
    nonce: u64,
    range: u64,
) -> Result<()> {
    println!(
        "{} | {} solving {} nonces from {} ({} trim rounds)",
        Local::now().format("%H:%M:%S"),
        P::name(),
        range,
        nonce,
        if settings.ntrims == 0 {
            P::default_ntrims()
        } else {
            settings.ntrims
        }
    );

    let mut ctx = SolverCtx::<P>::new(settings)?;
    let started = Instant::now();
    let report = ctx.run_solver(header, nonce, range);
    let elapsed = started.elapsed().as_secs_f64();

    for solution in &report.solutions {
        println!(
            "{} | solution at nonce {}: {:?}",
            Local::now().format("%H:%M:%S"),
            solution.nonce,
            solution.proof.nonces
        );
        println!(
            "{} | cyclehash {}",
            Local::now().format("%H:%M:%S"),
            solution.proof.cyclehash()
        );
    }

    let stats = &report.stats;
    println!(
        "{} | {} solutions, {} candidates ({} rejected), {} abandoned, {:.2} graphs/s",
        Local::now().format("%H:%M:%S"),
        stats.solutions,
        stats.candidates,
        stats.rejected,
        stats.abandoned,
        stats.nonces_attempted as f64 / elapsed.max(f64::EPSILON)
    );
    Ok(())
}

fn bench<P: CuckooParams>(settings: SolverSettings, iterations: u64) -> Result<()> {
    let mut ctx = SolverCtx::<P>::new(settings)?;
    let header = vec![0u8; HEADER_LEN];
    let mut total_ms = 0u128;
    let mut found = 0u64;

    for i in 0..iterations {
        let started = Instant::now();
        let report = ctx.run_solver(&header, i, 1);
        let ms = started.elapsed().as_millis();
        total_ms += ms;
        found += report.stats.solutions;
        println!(
            "iteration {}: {}ms, {} survivors, {} solutions",
            i,
            ms,
            report.stats.trim.edges_remaining,
            report.stats.solutions
        );
    }

    println!(
        "{}: {} iterations in {}ms (avg {:.1}ms/graph), {} solutions",
        P::name(),
        iterations,
        total_ms,
        total_ms as f64 / iterations.max(1) as f64,
        found
    );
    Ok(())
}

fn print_info() {
    println!(
        "{:<12} {:>10} {:>8} {:>9} {:>12} {:>12}",
        "geometry", "edges", "cycle", "buckets", "survivors", "arenas"
    );
    print_info_row::<Cyclone8>();
    print_info_row::<Cyclone19>();
    print_info_row::<Cyclone29>();
}

fn print_info_row<P: CuckooParams>() {
    let defaults = SolverSettings::default();
    let bytes = memory_estimate::<P>(defaults.neps_a, defaults.neps_b);
    println!(
        "{:<12} {:>10} {:>8} {:>9} {:>12} {:>11.1}M",
        P::name(),
        P::NUM_EDGES,
        P::PROOF_SIZE,
        P::NUM_BUCKETS,
        P::MAX_EDGES,
        bytes as f64 / (1024.0 * 1024.0)
    );
}
