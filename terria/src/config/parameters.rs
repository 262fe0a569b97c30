//! Application parameters from the `parameters` object of the app config.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Application-level parameters.
///
/// Serialised with camelCase keys, matching the `parameters` object of a
/// Terria application config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigParameters {
    pub app_name: String,
    pub support_email: String,
    /// Directories searched for init fragments named without `.json`.
    pub init_fragment_paths: Vec<String>,
    /// Restore the last viewer mode from local properties.
    pub persist_viewer_mode: bool,
    pub story_enabled: bool,
    pub cors_proxy_base_url: String,
    pub share_url: String,
    pub server_config_url: String,
    pub default_maximum_shown_feature_infos: u32,
    pub feedback_url: Option<String>,
    pub show_welcome_message: bool,
}

impl Default for ConfigParameters {
    fn default() -> Self {
        Self {
            app_name: "TerriaJS App".to_string(),
            support_email: "info@terria.io".to_string(),
            init_fragment_paths: vec!["init/".to_string()],
            persist_viewer_mode: true,
            story_enabled: true,
            cors_proxy_base_url: "proxy/".to_string(),
            share_url: "share".to_string(),
            server_config_url: "serverconfig/".to_string(),
            default_maximum_shown_feature_infos: 100,
            feedback_url: None,
            show_welcome_message: false,
        }
    }
}

impl ConfigParameters {
    /// Overlays the known keys of `parameters` onto `self`.
    ///
    /// Unknown keys and values of the wrong shape are ignored one key at a
    /// time, so a single bad entry never discards the rest.
    pub fn update(&mut self, parameters: &Value) {
        let Some(object) = parameters.as_object() else {
            return;
        };
        let Ok(Value::Object(mut current)) = serde_json::to_value(&*self) else {
            return;
        };

        for (key, value) in object {
            if !current.contains_key(key) {
                debug!(key = %key, "Ignoring unknown config parameter");
                continue;
            }
            let mut candidate = current.clone();
            candidate.insert(key.clone(), value.clone());
            match serde_json::from_value::<ConfigParameters>(Value::Object(candidate)) {
                Ok(_) => {
                    current.insert(key.clone(), value.clone());
                }
                Err(e) => debug!(key = %key, error = %e, "Ignoring invalid config parameter"),
            }
        }

        if let Ok(updated) = serde_json::from_value(Value::Object(current)) {
            *self = updated;
        }
    }
}
