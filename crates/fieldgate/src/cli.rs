//! Clap derive structures for the `fieldgate` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fieldgate -- image ingestion, stale reclamation and snapshot cadence
/// for intermittently-connected field devices
#[derive(Debug, Parser)]
#[command(
    name = "fieldgate",
    version,
    about = "Track field-device image uploads and schedule site snapshots",
    long_about = "Operator tooling for the fieldgate engine.\n\n\
        Tracks chunked image uploads from field devices, reclaims transfers\n\
        that stopped making progress, and issues per-site snapshot commands\n\
        on each site's configured cadence.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "FIELDGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output [default: from config, else auto]
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Output, Color & Log Enums ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the periodic stale sweep and cadence scheduler until interrupted
    Run(RunArgs),

    /// Feed a recorded scenario through a fresh engine
    Replay(ReplayArgs),

    /// Operator stale sweep for one device, after replaying a scenario
    Sweep(SweepArgs),

    /// Inspect and validate snapshot cadences
    Cadence(CadenceArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seed file with companies, programs, sites and devices
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Stop after this long instead of waiting for Ctrl-C (e.g. "30s", "2h")
    #[arg(long)]
    pub duration: Option<String>,
}

// ── Replay ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON scenario file
    pub scenario: PathBuf,

    /// Seed file applied before the scenario's own hierarchy
    #[arg(long)]
    pub seed: Option<PathBuf>,
}

// ── Sweep ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// JSON scenario that establishes the transfers to sweep
    #[arg(long)]
    pub scenario: PathBuf,

    /// Device whose stale transfers are cleared
    #[arg(long)]
    pub device: String,

    /// Minimum inactivity, in whole hours
    #[arg(long, default_value_t = 1)]
    pub age_hours: u32,

    /// Instant the sweep runs at (RFC 3339); defaults to the current time
    #[arg(long)]
    pub at: Option<String>,

    /// Seed file applied before the scenario's own hierarchy
    #[arg(long)]
    pub seed: Option<PathBuf>,
}

// ── Cadence ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CadenceArgs {
    #[command(subcommand)]
    pub command: CadenceCommand,
}

#[derive(Debug, Subcommand)]
pub enum CadenceCommand {
    /// Print the next due instants of a cadence
    Next {
        #[command(flatten)]
        cadence: CadenceFlags,

        /// Start instant (RFC 3339); defaults to the current time
        #[arg(long)]
        from: Option<String>,

        /// How many instants to print
        #[arg(long, default_value_t = 5)]
        count: usize,
    },

    /// Check a cadence configuration
    Validate {
        #[command(flatten)]
        cadence: CadenceFlags,
    },
}

#[derive(Debug, Args)]
pub struct CadenceFlags {
    /// Snapshots per day (1, 2, 3, 4, 6, 8, 12, 24, 48 or 96)
    #[arg(long)]
    pub per_day: Option<u32>,

    /// Hours between snapshots (0.25 to 24)
    #[arg(long)]
    pub hours: Option<f64>,

    /// IANA timezone whose midnight anchors the schedule
    #[arg(long)]
    pub tz: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
