pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use config::ScrapeConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the URL list until it is drained
    Scrape {
        /// URL list file, one URL per line
        #[arg(short, long)]
        urls: Option<PathBuf>,

        /// Output directory for fetched pages
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker count (default: one per logical core)
        #[arg(short = 'n', long)]
        threads: Option<usize>,

        /// Per-worker failure tolerance before the worker retires
        #[arg(long)]
        fail_limit: Option<usize>,
    },

    /// Verify that the SOCKS proxy is up and routing through Tor
    CheckTor,

    /// Show the active configuration
    Config {
        /// Write the configuration as the new default and exit
        #[arg(long)]
        init: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ScrapeConfig::load_from_file(path)?,
        None => ScrapeConfig::load_default()?,
    };

    match cli.command {
        Commands::Scrape {
            urls,
            output,
            threads,
            fail_limit,
        } => commands::scrape(config, urls, output, threads, fail_limit).await,
        Commands::CheckTor => commands::check_tor(config).await,
        Commands::Config { init } => commands::show_config(config, init),
    }
}
