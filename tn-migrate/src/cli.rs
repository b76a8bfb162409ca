use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "tn-migrate")]
#[command(about = "Migrate switch ports from tn3 to tn4 and reconcile the inventory")]
pub struct Cli {
    /// Settings file (TOML); built-in defaults when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Raise log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Parse one device configuration and show the extracted facts.
    Parse(ParseArgs),
    /// Build the desired tn4 port model offline and write the migration report.
    Migrate(MigrateArgs),
    /// Migrate, then bring the inventory of record in line with the result.
    Reconcile(ReconcileArgs),
}

#[derive(Parser, Debug)]
pub struct ParseArgs {
    pub file: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Inputs shared by `migrate` and `reconcile`.
#[derive(clap::Args, Debug)]
pub struct MigrationInputs {
    /// Topology snapshot (JSON).
    #[arg(long)]
    pub snapshot: PathBuf,
    /// Directory of legacy device configurations, one file per hostname.
    #[arg(long)]
    pub configs: PathBuf,
    /// Rulebook (TOML, or JSON by extension).
    #[arg(long)]
    pub rules: PathBuf,
    /// Where to write the JSON run report.
    #[arg(long)]
    pub report: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub inputs: MigrationInputs,
}

#[derive(Parser, Debug)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub inputs: MigrationInputs,
    /// Desired sites, site groups and devices (TOML, or JSON by extension).
    #[arg(long)]
    pub registry: PathBuf,
    /// Extra VLAN catalogue (`set vlans` or `vlans { }` form).
    #[arg(long)]
    pub vlans: Option<PathBuf>,
    /// Inventory root URL; overrides the settings file.
    #[arg(long)]
    pub url: Option<String>,
    /// Write batch size; overrides the settings file.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Plan against the inventory without writing.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
