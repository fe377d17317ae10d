//! Command-line interface for reportforge.
//!
//! Provides template linting and rendering plus status, listing, export and
//! deletion of generated reports.

mod commands;

pub use commands::{exit_code, parse_cli, run, run_with_cli, Cli, Commands};
