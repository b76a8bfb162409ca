use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tn_migrate::config::{default_settings, load_settings, Settings};
use tracing_subscriber::EnvFilter;

mod cli;
mod migrate_cmd;
mod parse_cmd;
mod reconcile_cmd;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = settings(cli.config.as_deref())?;

    match cli.command {
        Command::Parse(args) => parse_cmd::run_parse(args, &settings),
        Command::Migrate(args) => migrate_cmd::run_migrate(args, &settings),
        Command::Reconcile(args) => reconcile_cmd::run_reconcile(args, &settings),
    }
}

/// `RUST_LOG` wins; otherwise warnings, raised by each `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => load_settings(path)
            .with_context(|| format!("failed to load settings {}", path.display())),
        None => Ok(default_settings()),
    }
}
