// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `workbridge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "workbridge",
    version,
    about = "Dispatch background work to an external executor and track its completion.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Workbridge.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WORKBRIDGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the workers, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Enqueue work at startup, as `<worker>=<payload>`. Repeatable.
    #[arg(long, value_name = "WORKER=PAYLOAD", value_parser = parse_enqueue)]
    pub enqueue: Vec<EnqueueArg>,
}

/// One `--enqueue` item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueArg {
    pub worker: String,
    pub payload: String,
}

fn parse_enqueue(raw: &str) -> Result<EnqueueArg, String> {
    let (worker, payload) = raw.split_once('=').unwrap_or((raw, ""));
    let worker = worker.trim();
    if worker.is_empty() {
        return Err(format!("missing worker name in '{raw}'"));
    }
    Ok(EnqueueArg {
        worker: worker.to_string(),
        payload: payload.to_string(),
    })
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
