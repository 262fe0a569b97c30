//! Persisted per-application properties (the browser's `localStorage`).
//!
//! Keys are namespaced by application name as `appName.key`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::warn;

/// Key/value store for persisted settings such as the chosen base map.
pub trait LocalPropertyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a value, returning `false` if the store is unavailable.
    fn set(&self, key: &str, value: &str) -> bool;
}

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalPropertyStore for MemoryPropertyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        self.values.write().insert(key.to_string(), value.to_string());
        true
    }
}

/// Store persisted as a flat JSON object in a file.
///
/// The file is read once on creation and rewritten on every `set`.
#[derive(Debug)]
pub struct FilePropertyStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FilePropertyStore {
    /// Opens the store at `path`; a missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    /// `<data dir>/terria/properties.json`.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("terria")
            .join("properties.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, text)
    }
}

impl LocalPropertyStore for FilePropertyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        match self.persist(&values) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to persist local property");
                false
            }
        }
    }
}
