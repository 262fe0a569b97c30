//! Terria CLI - Command-line interface
//!
//! Resolves catalog init sources and application configs with the terria
//! library and prints the resulting catalog and workbench.

mod commands;
mod error;
mod runner;

use std::future::Future;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "terria", version, about = "Load Terria catalogs from init sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load init files or URLs and print the catalog they produce
    Load {
        /// Init JSON files or URLs, applied in order
        #[arg(required = true)]
        sources: Vec<String>,

        /// Request timeout in seconds (overrides fetch.timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run application start-up from a config file and application URL
    Start {
        /// Application config JSON (overrides terria.config_url)
        #[arg(long)]
        config_url: Option<String>,

        /// URL the application was opened with, e.g. `https://map/#clean&my-init`
        #[arg(long)]
        app_url: Option<String>,

        /// Request timeout in seconds (overrides fetch.timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// View or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn block_on<F>(future: F) -> Result<(), CliError>
where
    F: Future<Output = Result<(), CliError>>,
{
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?
        .block_on(future)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Load { sources, timeout } => {
            block_on(commands::load::run(commands::load::LoadArgs { sources, timeout }))
        }
        Commands::Start {
            config_url,
            app_url,
            timeout,
        } => block_on(commands::start::run(commands::start::StartArgs {
            config_url,
            app_url,
            timeout,
        })),
        Commands::Config { command } => commands::config::run(command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
