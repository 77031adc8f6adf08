//! CLI definitions and dispatch.

mod config_cmd;
mod recent;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use loofinder::config::Config;

#[derive(Parser, Debug)]
#[command(name = "loofinder", version, about = "Recently viewed toilets, cached on device")]
pub(crate) struct Cli {
    /// Log output format (logs go to stderr).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Inspect and update recently viewed toilets.
    Recent {
        #[command(subcommand)]
        action: RecentAction,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum RecentAction {
    /// Record that a toilet's detail view was opened.
    View {
        /// Toilet id.
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        rating: Option<f64>,
        /// Image reference (URL or asset key).
        #[arg(long)]
        image: Option<String>,
    },
    /// List recently viewed toilets, newest first.
    List {
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// List the most viewed toilets.
    Top {
        #[arg(long)]
        json: bool,
    },
    /// Show one entry.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Forget one entry.
    Remove { id: String },
    /// Forget every entry.
    Clear,
    /// Show totals.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file path.
    Path,
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    match cli.command {
        Command::Recent { action } => recent::cmd_recent(action, &config).await,
        Command::Config { action } => config_cmd::cmd_config(action, &config),
    }
}
