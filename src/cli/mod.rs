//! Command-line interface for tac-evaluator.
//!
//! Provides commands for running evaluations, checking the agent and the
//! shared services, and preparing precomputed task data.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
