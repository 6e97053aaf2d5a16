//! Command-line interface for dining-concierge.
//!
//! Provides commands for running the fulfillment worker, feeding the queue
//! and preparing the record store.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
