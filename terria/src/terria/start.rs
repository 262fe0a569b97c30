//! Application start-up and URL handling.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{ErrorOverrides, ErrorText, TerriaError};

use super::init_source::{generate_initialization_url, InitSource};
use super::viewer::ViewerMode;
use super::Terria;

const VIEWER_MODE_PROPERTY: &str = "viewermode";

/// Options for [`Terria::start`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// URL or path of the application config JSON.
    pub config_url: String,
    /// URL the application was opened with; its hash carries start data.
    pub application_url: Option<String>,
}

/// Parses `value` as a URL, falling back to an absolute `file://` URL for
/// filesystem paths.
pub fn resolve_url(value: &str) -> Option<Url> {
    if let Ok(url) = Url::parse(value) {
        if url.scheme().len() > 1 {
            return Some(url);
        }
    }
    let path = Path::new(value);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    Url::from_file_path(absolute).ok()
}

/// The URL with its file name, query and fragment removed.
fn base_url(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.join("./").unwrap_or(base)
}

/// Key/value pairs of a URL fragment, in order.
fn hash_properties(url: &Url) -> Vec<(String, String)> {
    url.fragment()
        .map(|fragment| {
            url::form_urlencoded::parse(fragment.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

impl Terria {
    /// Loads the application config and start data.
    ///
    /// The config's `parameters` are applied and its `initializationUrls`
    /// registered as init sources. A config that fails to load is reported
    /// to the user and start-up continues with defaults. When an
    /// application URL is given its hash is interpreted; init sources are
    /// then loaded and persisted map settings restored.
    pub async fn start(&self, options: StartOptions) {
        let application_url = options.application_url.as_deref().and_then(resolve_url);
        if let Some(url) = &application_url {
            if let Some((_, value)) = hash_properties(url).into_iter().find(|(k, _)| k == "ignoreErrors") {
                self.set_user_property("ignoreErrors", &value);
            }
        }

        info!(config_url = %options.config_url, "Starting");
        match self.load_config(&options.config_url).await {
            Ok(()) => {}
            Err(e) => self.raise_error_to_user(e),
        }

        match (&application_url, &options.application_url) {
            (Some(url), _) => self.update_application_url(url.as_str()).await,
            (None, Some(raw)) => {
                warn!(url = %raw, "Ignoring unparseable application URL");
                self.load_init_sources_and_report().await;
            }
            (None, None) => self.load_init_sources_and_report().await,
        }

        self.load_persisted_map_settings();
    }

    async fn load_config(&self, config_url: &str) -> Result<(), TerriaError> {
        let load_error = |e: TerriaError| {
            TerriaError::from_error(
                e,
                ErrorOverrides::new()
                    .title(ErrorText::key("models.terria.loadConfigErrorTitle"))
                    .message(format!("Couldn't load {}", config_url)),
            )
        };
        let base = resolve_url(config_url)
            .ok_or_else(|| load_error(TerriaError::from_error(format!("Invalid config URL `{}`", config_url), None)))?;

        let config = self
            .fetcher
            .fetch_json(base.as_str())
            .await
            .map_err(|e| load_error(e.into()))?;

        if config.get("aspects").is_some() {
            warn!(config_url, "Magda map configs are not supported; using parameters only");
        }
        if let Some(parameters) = config.get("parameters").filter(|p| p.is_object()) {
            self.update_parameters(parameters);
        }
        self.setup_initialization_urls(&base_url(&base), &config);
        Ok(())
    }

    /// Registers the config's `initializationUrls` as init sources.
    ///
    /// `v7initializationUrls` need catalog conversion, which is not
    /// available; they are logged and skipped.
    pub fn setup_initialization_urls(&self, base: &Url, config: &Value) {
        let fragment_paths = self.parameters().init_fragment_paths;
        let sources: Vec<InitSource> = config
            .get("initializationUrls")
            .and_then(Value::as_array)
            .map(|urls| {
                urls.iter()
                    .filter_map(Value::as_str)
                    .map(|url| InitSource {
                        name: Some(format!("Init URL from config {}", url)),
                        kind: generate_initialization_url(base, &fragment_paths, url),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(v7) = config.get("v7initializationUrls").and_then(Value::as_array) {
            for url in v7.iter().filter_map(Value::as_str) {
                warn!(url, "Skipping v7 catalog; conversion to v8 is not supported");
            }
        }

        debug!(count = sources.len(), "Registered initialization URLs");
        self.add_init_sources(sources);
    }

    /// Interprets the hash of `new_url` and loads init sources.
    ///
    /// Hash properties are applied in order:
    /// - `clean` drops all init sources registered so far,
    /// - `hideWelcomeMessage` turns the welcome message off,
    /// - `start` is JSON start data,
    /// - any other property with a value becomes a user property,
    /// - a property without a value names an init fragment.
    pub async fn update_application_url(&self, new_url: &str) {
        match resolve_url(new_url) {
            Some(url) => {
                if let Err(e) = self.interpret_hash(&url) {
                    self.raise_error_to_user(e);
                }
            }
            None => warn!(url = new_url, "Ignoring unparseable application URL"),
        }
        self.load_init_sources_and_report().await;
    }

    fn interpret_hash(&self, url: &Url) -> Result<(), TerriaError> {
        let base = base_url(url);
        let properties = hash_properties(url);

        for (property, value) in &properties {
            match property.as_str() {
                "clean" => self.clear_init_sources(),
                "hideWelcomeMessage" => self.parameters.write().show_welcome_message = false,
                "start" => {
                    let start_data: Value = serde_json::from_str(value).map_err(|e| {
                        TerriaError::from_error(
                            e,
                            ErrorOverrides::new()
                                .message(ErrorText::key("models.terria.parsingStartDataErrorMessage")),
                        )
                    })?;
                    self.interpret_start_data(&start_data, "Start data from hash");
                }
                _ if !value.is_empty() => self.set_user_property(property, value),
                _ => {
                    let fragment_paths = self.parameters().init_fragment_paths;
                    self.add_init_sources(vec![InitSource {
                        name: Some(format!("InitUrl from applicationURL hash {}", property)),
                        kind: generate_initialization_url(&base, &fragment_paths, property),
                    }]);
                }
            }
        }

        if properties.iter().any(|(k, _)| k == "share") {
            warn!("Share links need a share data service, which is not configured");
        }
        Ok(())
    }

    /// Registers each entry of `initSources` in `start_data` as inline
    /// init data.
    fn interpret_start_data(&self, start_data: &Value, name: &str) {
        if let Some(sources) = start_data.get("initSources").and_then(Value::as_array) {
            self.add_init_sources(
                sources
                    .iter()
                    .map(|source| InitSource::data(name.to_string(), source.clone()))
                    .collect(),
            );
        }
    }

    /// Registers start data and loads init sources.
    pub async fn update_from_start_data(&self, start_data: &Value, name: Option<&str>) -> Result<(), TerriaError> {
        self.interpret_start_data(start_data, name.unwrap_or("Application start data"));
        self.load_init_sources().await
    }

    /// Switches the viewer mode and remembers it in the local property
    /// store when `persistViewerMode` is set.
    pub fn set_viewer_mode(&self, mode: ViewerMode, use_terrain: Option<bool>) {
        self.main_viewer.set_viewer_mode(mode, use_terrain);
        if self.parameters().persist_viewer_mode {
            let name = self.main_viewer.mode_name();
            if !self.set_local_property(VIEWER_MODE_PROPERTY, name) {
                warn!(mode = name, "Failed to persist viewer mode");
            }
        }
    }

    /// Restores the persisted viewer mode when enabled.
    pub fn load_persisted_map_settings(&self) {
        if !self.parameters().persist_viewer_mode {
            return;
        }
        if let Some(mode) = self.get_local_property(VIEWER_MODE_PROPERTY) {
            if !self.main_viewer.apply_mode_name(&mode) {
                error!(mode = %mode, "Trying to select a viewer mode that doesn't exist");
            }
        }
    }

    async fn load_init_sources_and_report(&self) {
        if let Err(e) = self.load_init_sources().await {
            self.raise_error_to_user(e);
        }
    }
}
