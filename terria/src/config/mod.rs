//! Configuration.
//!
//! Two layers: [`ConfigParameters`] come from the application config JSON
//! and shape the running engine, while [`ConfigFile`] is the user's INI
//! file with defaults for the command-line tool.

mod file;
mod parameters;

pub use file::{
    config_file_path, ConfigError, ConfigFile, ConfigKey, FetchSettings, LoggingConfig,
    TerriaSettings, DEFAULT_LOG_LEVEL,
};
pub use parameters::ConfigParameters;
