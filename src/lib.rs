// src/lib.rs - Main library file for Cyclone29 Cuckoo Cycle solving
// Tree location: ./src/lib.rs

//! Cyclone29 - CPU-parallel Cuckoo Cycle solver
//!
//! A bucketed edge-trimming engine for Cuckoo Cycle proof-of-work graphs:
//! SipHash edge generation, multi-round leaf pruning over two ping-pong
//! arenas, optional tag relay, union-find cycle finding, and nonce
//! recovery. Built on rayon for data parallelism, with one worker task
//! per bucket.
//!
//! # Version History
//! - 0.1.0: Initial trimming pipeline and cycle finder
//! - 0.2.0: Parameter-set trait, sequential reference, relay stage
//! - 0.3.0: Solver context with cancellation and range driver

#![warn(missing_docs)]

pub mod config;
/// Cycle detection over trimmed survivor sets
pub mod graph;
/// Compile-time graph parameter sets
pub mod params;
/// Nonce recovery for candidate cycles
pub mod recover;
/// SipHash-2-4 endpoint oracle
pub mod siphash;
/// Solver context and proof verification
pub mod solver;
/// Bucketed trimming pipeline
pub mod trimmer;

// Re-export main types for convenience
pub use config::{default_params, SolverSettings};
pub use params::{CuckooParams, Cyclone19, Cyclone29, Cyclone8};
pub use siphash::SipKeys;
pub use solver::{verify, Proof, Solution, SolveReport, SolverCtx, VerifyError};
pub use trimmer::Trimmer;

use thiserror::Error;

/// Main error type for Cyclone29
#[derive(Error, Debug)]
pub enum Cyclone29Error {
    /// Invalid or inconsistent solver settings
    #[error("Settings error: {0}")]
    Settings(String),

    /// Header preparation or key derivation errors
    #[error("Header error: {0}")]
    Header(String),

    /// Proof verification errors
    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    /// IO operation errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hex decoding errors
    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Cyclone29 operations
pub type Result<T> = std::result::Result<T, Cyclone29Error>;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Application description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Initialize logging for binary entry points.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("{} v{} - {}", NAME, VERSION, DESCRIPTION);
    Ok(())
}
