//! Clap derive structures for the `solarweb` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// solarweb -- mirror a Fronius Solar.web account into a local state tree
#[derive(Debug, Parser)]
#[command(
    name = "solarweb",
    version,
    about = "Mirror Fronius Solar.web PV systems into a local state tree",
    long_about = "Logs in to the Solar.web query API, discovers the account's PV systems\n\
        and keeps a hierarchical mirror of their feeds current.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "SOLARWEB_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SOLARWEB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Keep the mirror running until SIGINT/SIGTERM
    Run(RunArgs),

    /// Log in, sweep once and print the tree
    Once(OnceArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Write the tree as JSON here after every sweep
    #[arg(long)]
    pub snapshot_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct OnceArgs {
    /// Output format (defaults to `defaults.output` in the config)
    #[arg(long, short = 'o')]
    pub output: Option<OutputFormat>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Print the active profile with secrets masked
    Show,
}
