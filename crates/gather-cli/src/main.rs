//! `gather`: collect rotated logs from a fleet of nodes

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gather")]
#[command(about = "Collect diagnostic logs from local, SSH, Docker and Kubernetes nodes")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "gather.yaml")]
    config: PathBuf,

    /// Log debug output from every stage
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gather logs from the configured nodes
    Log(LogArgs),

    /// Validate configuration file
    Validate,
}

/// Summary output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One row per node
    #[default]
    Table,
    /// The per-node results as JSON
    Json,
}

/// Flags of `gather log`; each one overrides the configuration file
#[derive(Args, Debug, Default)]
pub struct LogArgs {
    /// Scope to collect (observer, election, rootservice, all, or a configured scope)
    #[arg(short, long)]
    pub scope: Option<String>,

    /// Window start, `yyyy-mm-dd hh:mm:ss`
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// Window end, `yyyy-mm-dd hh:mm:ss`
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Trailing window such as 30m, 2h or 1d
    #[arg(long, conflicts_with_all = ["from", "to", "recent"])]
    pub since: Option<String>,

    /// Per log type, the N newest rotated files
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub recent: Option<usize>,

    /// Keep only lines matching every term (repeatable)
    #[arg(long)]
    pub grep: Vec<String>,

    /// Only these nodes, by name (repeatable)
    #[arg(short, long = "node")]
    pub nodes: Vec<String>,

    /// Local directory for bundles
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Remote scratch directory
    #[arg(long)]
    pub temp_dir: Option<String>,

    /// Maximum files per node
    #[arg(long)]
    pub file_number_limit: Option<usize>,

    /// Maximum bundle size in bytes
    #[arg(long)]
    pub file_size_limit: Option<u64>,

    /// Per-call timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Nodes processed at once
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Summary format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    pub format: Format,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    smol::block_on(async {
        match cli.command {
            Commands::Log(args) => commands::log::run(&cli.config, args).await,
            Commands::Validate => commands::validate::run(&cli.config).await,
        }
    })
}
