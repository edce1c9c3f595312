// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! NOTE: this expects `clap` to be built with the `derive` feature, e.g.:
//! `clap = { version = "4.5.53", features = ["derive"] }` in `Cargo.toml`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `codeloom`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "codeloom",
    version,
    about = "Decompose a coding task across execution backends and merge the results.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    ///
    /// Default: `Codeloom.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Codeloom.toml")]
    pub plan: String,

    /// Task description to run. Overrides the `task` entry in the plan.
    #[arg(long, value_name = "TEXT")]
    pub task: Option<String>,

    /// Resolve, route and price the plan without executing any backend.
    #[arg(long)]
    pub dry_run: bool,

    /// Write the final artifact to this path instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub output: Option<String>,

    /// Write the full run report as JSON to this path.
    #[arg(long, value_name = "PATH")]
    pub report: Option<String>,

    /// Maximum number of subtasks run concurrently. Overrides the plan.
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CODELOOM_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
