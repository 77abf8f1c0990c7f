//! imgharvest: keyword-driven image crawler

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use imgharvest::config::{Config, LogFormat, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "imgharvest")]
#[command(about = "Crawl the web for images matching keywords")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults are used when it does not exist)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output directory for downloaded images
    #[arg(short, long)]
    base_path: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl, download and sweep in one process
    Run {
        /// Keywords to search for (repeatable)
        #[arg(short, long = "keyword", required = true)]
        keywords: Vec<String>,

        /// Extra text appended to every search query
        #[arg(short, long)]
        qualifier: Option<String>,
    },

    /// Crawl only, leaving download jobs on the shared queue
    Crawl {
        /// Keywords to search for (repeatable)
        #[arg(short, long = "keyword", required = true)]
        keywords: Vec<String>,

        /// Extra text appended to every search query
        #[arg(short, long)]
        qualifier: Option<String>,
    },

    /// Run download workers against the shared queue
    Worker {
        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Remove byte-identical images within each keyword directory
    Sweep {
        /// Keep sweeping on the configured interval until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },

    /// Zip the output directory, then delete it and reset counters
    Archive {
        /// Archive file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show counters, queue length and images on disk
    Stats,

    /// Write a default configuration file
    Init {
        /// Config file to create
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn init_logging(config: &Config, verbose: u8) -> Result<()> {
    let level: Level = config.logging.effective_level(verbose).into();
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);
    match config.logging.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { path, force } = cli.command {
        init_logging(&Config::default(), cli.verbose)?;
        return commands::init::init_config(path, force).await;
    }

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(base_path) = cli.base_path {
        config.download.base_path = base_path;
    }
    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Run { keywords, qualifier } => commands::run::run(config, keywords, qualifier).await,
        Commands::Crawl { keywords, qualifier } => {
            commands::crawl::crawl(config, keywords, qualifier).await
        }
        Commands::Worker { workers } => commands::worker::worker(config, workers).await,
        Commands::Sweep { watch } => commands::sweep::sweep(config, watch).await,
        Commands::Archive { output } => commands::archive::archive(config, output).await,
        Commands::Stats => commands::stats::show_stats(config).await,
        Commands::Init { .. } => Ok(()),
    }
}
