//! Tracing subscriber setup.

pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global fmt subscriber.
///
/// The filter defaults to `config.level` and is overridden by `RUST_LOG`.
/// With a log file configured, output goes through a non-blocking writer
/// whose guard must be kept alive until shutdown; otherwise logs go to
/// stderr and no guard is returned.
///
/// Returns `None` without installing anything if a global subscriber is
/// already set.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_LEVEL));

    let file = config
        .file
        .as_deref()
        .and_then(|path| path.file_name().map(|name| (path.parent(), name)));

    match file {
        Some((directory, file_name)) => {
            let directory = directory.filter(|p| !p.as_os_str().is_empty());
            let appender = tracing_appender::rolling::never(
                directory.unwrap_or_else(|| std::path::Path::new(".")),
                file_name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .try_init()
                .ok()
                .map(|_| guard)
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
    }
}
