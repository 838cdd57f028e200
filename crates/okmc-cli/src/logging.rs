use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self},
    prelude::*,
};

/// Target of the engine modules, whose trace events fire once per kinetic step.
const ENGINE_TARGET: &str = "okmc::engine";
/// Verbosity from which per-step engine events reach the console.
const STEP_TRACE_VERBOSITY: u8 = 4;

fn base_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn engine_level(level: LevelFilter, verbosity: u8) -> LevelFilter {
    if verbosity >= STEP_TRACE_VERBOSITY {
        level
    } else {
        level.min(LevelFilter::DEBUG)
    }
}

/// `-v` raises the console level one step at a time. Step traces from the engine need `-vvvv`.
fn console_filter(verbosity: u8, quiet: bool) -> Targets {
    let level = base_level(verbosity, quiet);
    Targets::new()
        .with_default(level)
        .with_target(ENGINE_TARGET, engine_level(level, verbosity))
}

/// The log file records at least run and stage summaries, whatever the console shows.
fn file_filter(verbosity: u8) -> Targets {
    let level = base_level(verbosity, false).max(LevelFilter::INFO);
    Targets::new()
        .with_default(level)
        .with_target(ENGINE_TARGET, engine_level(level, verbosity))
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(console_filter(verbosity, quiet));

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(&path)?;
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_filter(file_filter(verbosity)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install logger: {}", e)))
}
