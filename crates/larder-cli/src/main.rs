#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "larder: archive aging provider records out of the hot store",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format. Overrides `FORMAT` and the TTY default.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Path to larder.toml. Defaults to ./larder.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Create the hot store and archive directory",
        long_about = "Create the hot-store database with the current schema and the archive directory. Safe to re-run.",
        after_help = "EXAMPLES:\n    # Initialize with defaults in the current directory\n    larder init\n\n    # Initialize from an explicit config\n    larder init --config /etc/larder/larder.toml"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Archive stale records and prune the hot store",
        long_about = "Move raw records older than the retention window into per-partition gzip archives, then delete them from the hot store. Aggregates stay in place.",
        after_help = "EXAMPLES:\n    # Archive everything older than the configured window\n    larder archive\n\n    # Keep three months, only bork data\n    larder archive --months 3 --provider bork\n\n    # Preview without writing or deleting\n    larder archive --dry-run --json"
    )]
    Archive(cmd::archive::ArchiveArgs),

    #[command(
        about = "Report stale records without archiving",
        long_about = "Count the records that would be archived, per provider, along with their partitions and footprint. Read-only.",
        after_help = "EXAMPLES:\n    # What would the next run pick up?\n    larder stale\n\n    # Emit machine-readable output\n    larder stale --months 2 --json"
    )]
    Stale(cmd::stale::StaleArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LARDER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "larder=debug,info"
        } else {
            "larder=info,warn"
        })
    });

    let format = env::var("LARDER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let working_dir = env::current_dir()?;
    let output = cli.output_mode();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, config_path, output, &working_dir),
        Commands::Archive(ref args) => {
            cmd::archive::run_archive(args, config_path, output, &working_dir)
        }
        Commands::Stale(ref args) => cmd::stale::run_stale(args, config_path, output, &working_dir),
    }
}
