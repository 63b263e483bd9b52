//! Command-line interface.

mod commands;
mod progress;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::runner::RunOptions;
use crate::sites::SiteRegistry;

#[derive(Parser)]
#[command(name = "expocrawl")]
#[command(about = "Export trade-show exhibitor directories to spreadsheets")]
#[command(version)]
pub struct Cli {
    /// Config file (default: discovered expocrawl.{toml,yaml,json})
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// List known sites
    List,

    /// Print a site descriptor as TOML
    Show {
        /// Site ID
        site: String,
    },

    /// Check site descriptors (all sites when none are given)
    Validate {
        /// Site IDs to check
        sites: Vec<String>,
    },

    /// Walk one or more sites and write their exhibitor lists
    Run {
        /// Site IDs to run, in order
        sites: Vec<String>,
        /// Run every known site
        #[arg(short, long)]
        all: bool,
        /// Output file (single site only; extension picks the format)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop after this many records per site
        #[arg(short, long)]
        limit: Option<usize>,
        /// Skip detail pages
        #[arg(long)]
        no_details: bool,
        /// Records between checkpoint saves
        #[arg(long)]
        checkpoint: Option<usize>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut settings, config) = load_settings_with_options(LoadOptions {
        config_path: cli.config,
    })
    .await
    .context("Failed to load configuration")?;
    let registry = SiteRegistry::with_config(&config).context("Failed to load site descriptors")?;

    match cli.command {
        Commands::List => commands::cmd_list(&registry),
        Commands::Show { site } => commands::cmd_show(&registry, &site),
        Commands::Validate { sites } => commands::cmd_validate(&registry, &sites),
        Commands::Run {
            sites,
            all,
            output,
            limit,
            no_details,
            checkpoint,
            headed,
        } => {
            if headed {
                settings.browser.headless = false;
            }
            let options = RunOptions {
                limit,
                details: !no_details,
                checkpoint_interval: checkpoint,
                output,
            };
            commands::cmd_run(&settings, &registry, &sites, all, options).await
        }
    }
}
