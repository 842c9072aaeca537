// src/config/mod.rs - Configuration module organization
// Tree location: ./src/config/mod.rs

//! Configuration module for solver settings

pub mod settings;

pub use settings::{default_params, SolverSettings};
