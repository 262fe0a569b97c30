//! Shared setup for commands that load catalogs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use terria::config::ConfigFile;
use terria::fetch::HttpJsonFetcher;
use terria::logging::{init_logging, WorkerGuard};
use terria::terria::FilePropertyStore;
use terria::Terria;
use tracing::info;

use crate::error::CliError;

/// Loads the config file, installs logging and builds [`Terria`].
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    pub fn new() -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let log_guard = init_logging(&config.logging);
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = terria::VERSION,
            command,
            timeout_secs = self.config.fetch.timeout_secs,
            "terria CLI starting"
        );
    }

    /// Builds an application fetching over HTTP and persisting local
    /// properties to the user's data directory.
    ///
    /// Errors raised to the user are printed to stderr and counted.
    pub fn create_terria(&self, timeout_secs: Option<u64>) -> Result<(Arc<Terria>, Arc<AtomicUsize>), CliError> {
        let fetcher = HttpJsonFetcher::with_timeout(timeout_secs.unwrap_or(self.config.fetch.timeout_secs))
            .map_err(|e| CliError::Config(e.to_string()))?;
        let terria = Terria::builder()
            .fetcher(Arc::new(fetcher))
            .local_properties(Arc::new(FilePropertyStore::open(FilePropertyStore::default_path())))
            .build()?;

        let raised = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&raised);
        terria.add_error_event_listener(move |error| {
            counter.fetch_add(1, Ordering::SeqCst);
            eprintln!("Error: {}", error.title());
            eprint!("{}", error.summary());
        });

        Ok((terria, raised))
    }
}
