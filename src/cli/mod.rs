//! Command-line interface for playlist-minder.
//!
//! Thin presentation layer: reads song lists, builds the orchestrator from
//! configuration, and prints the batch report.

mod commands;

pub use commands::{Cli, Commands, load_songs, read_songs, run_command};
