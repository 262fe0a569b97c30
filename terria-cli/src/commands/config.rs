//! Config command - view and edit `~/.terria/config.ini`.

use clap::Subcommand;
use terria::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Setting name as section.key (e.g., terria.config_url)
        key: String,
    },

    /// Change one setting; an empty value clears optional settings
    Set {
        /// Setting name as section.key (e.g., fetch.timeout_secs)
        key: String,

        /// New value (init_urls takes a comma-separated list)
        value: String,
    },

    /// Print every setting grouped by section
    List,

    /// Print where the config file lives
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            let config = ConfigFile::load()?;
            println!("{}", display_value(&key.get(&config)));
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let mut config = ConfigFile::load()?;
            key.set(&mut config, &value)?;
            config.save()?;
            println!("{} = {}", key, display_value(&key.get(&config)));
        }
        ConfigCommands::List => list(&ConfigFile::load()?),
        ConfigCommands::Path => println!("{}", config_file_path().display()),
    }
    Ok(())
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        let known: Vec<String> = ConfigKey::all().iter().map(ConfigKey::name).collect();
        CliError::Config(format!(
            "Unknown setting '{}'. Known settings: {}",
            key,
            known.join(", ")
        ))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn list(config: &ConfigFile) {
    println!("# {}", config_file_path().display());

    let mut section = None;
    for key in ConfigKey::all() {
        if section != Some(key.section()) {
            println!();
            println!("[{}]", key.section());
            section = Some(key.section());
        }
        println!("{} = {}", key.key_name(), display_value(&key.get(config)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_lists_known_settings_on_error() {
        let err = parse_key("terria.nope").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("terria.nope"));
        assert!(message.contains("fetch.timeout_secs"));
    }

    #[test]
    fn test_parse_key_accepts_section_and_key() {
        assert_eq!(parse_key("logging.level").unwrap(), ConfigKey::LoggingLevel);
    }

    #[test]
    fn test_display_value_marks_empty_values() {
        assert_eq!(display_value(""), "(not set)");
        assert_eq!(display_value("info"), "info");
    }
}
