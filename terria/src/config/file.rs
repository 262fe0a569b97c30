//! The user configuration file at `~/.terria/config.ini`.
//!
//! ```ini
//! [terria]
//! config_url = https://map.example.com/config.json
//! init_urls = init/base.json, init/extra.json
//!
//! [fetch]
//! timeout_secs = 30
//!
//! [logging]
//! level = info
//! file = /tmp/terria.log
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

use crate::fetch::DEFAULT_FETCH_TIMEOUT_SECS;

/// Name of the directory holding the config file.
const CONFIG_DIR_NAME: &str = ".terria";

/// Name of the config file.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Default log filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors reading or writing the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// `[terria]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerriaSettings {
    /// Application config JSON loaded by `terria start`.
    pub config_url: Option<String>,
    /// Extra init sources loaded after the application config.
    pub init_urls: Vec<String>,
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// Parsed contents of the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub terria: TerriaSettings,
    pub fetch: FetchSettings,
    pub logging: LoggingConfig,
}

/// Path of the config file, `~/.terria/config.ini`.
pub fn config_file_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

impl ConfigFile {
    /// Loads the config file from its default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section())).set(key.key_name(), value);
            }
        }
        ini
    }

    /// Writes the config file to its default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Writes the config file, creating its directory if necessary.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        self.to_ini().write_to_file(path).map_err(write_error)
    }
}

/// A settable `section.key` in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    TerriaConfigUrl,
    TerriaInitUrls,
    FetchTimeoutSecs,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// Every key in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::TerriaConfigUrl,
            ConfigKey::TerriaInitUrls,
            ConfigKey::FetchTimeoutSecs,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingFile,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::TerriaConfigUrl | ConfigKey::TerriaInitUrls => "terria",
            ConfigKey::FetchTimeoutSecs => "fetch",
            ConfigKey::LoggingLevel | ConfigKey::LoggingFile => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::TerriaConfigUrl => "config_url",
            ConfigKey::TerriaInitUrls => "init_urls",
            ConfigKey::FetchTimeoutSecs => "timeout_secs",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingFile => "file",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::TerriaConfigUrl => config.terria.config_url.clone().unwrap_or_default(),
            ConfigKey::TerriaInitUrls => config.terria.init_urls.join(", "),
            ConfigKey::FetchTimeoutSecs => config.fetch.timeout_secs.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parses and stores `value`. An empty value clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::TerriaConfigUrl => {
                config.terria.config_url = (!value.is_empty()).then(|| value.to_string());
            }
            ConfigKey::TerriaInitUrls => {
                config.terria.init_urls = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ConfigKey::FetchTimeoutSecs => {
                let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: self.name(),
                    value: value.to_string(),
                    reason: "expected a whole number of seconds".to_string(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: self.name(),
                        value: value.to_string(),
                        reason: "timeout must be greater than zero".to_string(),
                    });
                }
                config.fetch.timeout_secs = secs;
            }
            ConfigKey::LoggingLevel => {
                config.logging.level = if value.is_empty() {
                    DEFAULT_LOG_LEVEL.to_string()
                } else {
                    value.to_string()
                };
            }
            ConfigKey::LoggingFile => {
                config.logging.file = (!value.is_empty()).then(|| PathBuf::from(value));
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
