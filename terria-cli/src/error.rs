//! CLI error type.

use std::fmt;

use terria::config::ConfigError;
use terria::terria::BuildError;
use terria::TerriaError;

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or missing configuration.
    Config(String),
    /// The application could not be constructed.
    Build(BuildError),
    /// Loading reported errors to the user.
    Load(usize),
    /// The async runtime could not be started.
    Runtime(std::io::Error),
    /// Any other Terria error.
    Terria(TerriaError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Build(e) => write!(f, "Failed to start: {}", e),
            CliError::Load(1) => write!(f, "Loading reported 1 error"),
            CliError::Load(count) => write!(f, "Loading reported {} errors", count),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Terria(e) => write!(f, "{}", e.summary().trim_end()),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<BuildError> for CliError {
    fn from(e: BuildError) -> Self {
        CliError::Build(e)
    }
}

impl From<TerriaError> for CliError {
    fn from(e: TerriaError) -> Self {
        CliError::Terria(e)
    }
}
