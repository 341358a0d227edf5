//! Clap derive structures for the `omabus` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// omabus -- Omada controller to MQTT bridge
#[derive(Debug, Parser)]
#[command(
    name = "omabus",
    version,
    about = "Mirror Omada devices and switch ports onto an MQTT bus",
    long_about = "Polls an Omada controller through its OpenAPI, publishes device\n\
        snapshots and switch port state to MQTT, and applies PoE on/off\n\
        commands received on the bus.",
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
    #[arg(long, short = 'c', env = "OMABUS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format for one-shot commands
    #[arg(
        long,
        short = 'o',
        env = "OMABUS_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge until interrupted
    Run,

    /// Poll the controller once and print devices and ports
    #[command(alias = "ls")]
    Snapshot(SnapshotArgs),

    /// Switch PoE on a switch port on or off
    Poe(PoeArgs),

    /// Inspect the configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Only show this device (normalized key)
    pub device: Option<String>,

    /// List ports instead of devices
    #[arg(long)]
    pub ports: bool,
}

#[derive(Debug, Args)]
pub struct PoeArgs {
    /// Device key, e.g. `office_switch`
    pub device: String,

    /// Port number
    pub port: u32,

    /// Desired PoE state
    pub state: PowerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerState {
    #[value(alias = "1")]
    On,
    #[value(alias = "0")]
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
