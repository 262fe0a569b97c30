//! The application root.
//!
//! [`Terria`] owns the model registry, the catalog, the workbench and the
//! viewer state, and turns init sources into all of them:
//!
//! ```text
//!   init sources ──fetch──► JSON documents ──apply_init_data──► catalog
//!        │                                         │             models
//!        │                                         │             workbench
//!        │                                         │             viewer
//!        └────────── errors collected ─────────────┘
//!                        │
//!                 combine ─► raise_error_to_user (once)
//! ```
//!
//! Loading init sources goes through an [`AsyncLoader`], so concurrent
//! callers share one pass. Registering new init sources invalidates it.

mod base_maps;
mod init_data;
mod init_source;
mod model_stratum;
mod properties;
mod start;
mod timeline;
mod viewer;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::catalog::{builtin_factory, Catalog};
use crate::config::ConfigParameters;
use crate::error::{DeveloperError, ErrorOverrides, ErrorSource, ErrorText, TerriaError};
use crate::fetch::{FetchError, HttpJsonFetcher, JsonFetcher};
use crate::loader::{AsyncLoader, BoxFuture, LoadResult};
use crate::model::{ModelFactory, ModelRef, ModelRegistry};
use crate::workbench::Workbench;

pub use base_maps::{default_base_maps, BaseMap, BASE_MAP_PARENT_ID, DEFAULT_PREVIEW_BASE_MAP_ID};
pub use init_data::ApplyInitDataOptions;
pub use init_source::{generate_initialization_url, DeferredInitData, InitSource, InitSourceKind};
pub use properties::{FilePropertyStore, LocalPropertyStore, MemoryPropertyStore};
pub use start::{resolve_url, StartOptions};
pub use timeline::TimelineStack;
pub use viewer::{
    CameraView, MainViewer, PickLocation, PickedFeature, PickedFeatures, ViewerMode, ZoomRequest,
};

/// Callback receiving errors raised to the user.
pub type ErrorListener = Arc<dyn Fn(&TerriaError) + Send + Sync>;

/// Handle returned by [`Terria::add_error_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Builder for [`Terria`].
#[derive(Default)]
pub struct TerriaBuilder {
    factory: Option<ModelFactory>,
    fetcher: Option<Arc<dyn JsonFetcher>>,
    local_properties: Option<Arc<dyn LocalPropertyStore>>,
    parameters: Option<ConfigParameters>,
}

impl TerriaBuilder {
    /// Model types to support; defaults to the built-in types.
    pub fn factory(mut self, factory: ModelFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Where init sources and config are fetched from; defaults to HTTP and
    /// the local filesystem.
    pub fn fetcher(mut self, fetcher: Arc<dyn JsonFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Persistent property store; defaults to an in-memory store.
    pub fn local_properties(mut self, store: Arc<dyn LocalPropertyStore>) -> Self {
        self.local_properties = Some(store);
        self
    }

    pub fn parameters(mut self, parameters: ConfigParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn build(self) -> Result<Arc<Terria>, BuildError> {
        let registry = ModelRegistry::new(self.factory.unwrap_or_else(builtin_factory));
        let catalog = Catalog::new(&registry)?;
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpJsonFetcher::new()?),
        };
        let local_properties = self
            .local_properties
            .unwrap_or_else(|| Arc::new(MemoryPropertyStore::new()));

        Ok(Arc::new_cyclic(|weak: &Weak<Terria>| {
            let loader_ref = weak.clone();
            Terria {
                registry,
                catalog,
                workbench: Workbench::new(),
                timeline_stack: TimelineStack::new(),
                main_viewer: MainViewer::new(),
                fetcher,
                local_properties,
                parameters: RwLock::new(self.parameters.unwrap_or_default()),
                init_sources: RwLock::new(Vec::new()),
                init_source_loader: AsyncLoader::new("init-sources", move || -> BoxFuture<'static, LoadResult> {
                    let terria = loader_ref.upgrade();
                    Box::pin(async move {
                        match terria {
                            Some(terria) => terria.force_load_init_sources().await,
                            None => Ok(()),
                        }
                    })
                }),
                cors_domains: RwLock::new(Vec::new()),
                elements: RwLock::new(Map::new()),
                stories: RwLock::new(Vec::new()),
                base_maps: RwLock::new(Vec::new()),
                init_base_map_id: RwLock::new(None),
                init_base_map_name: RwLock::new(None),
                preview_base_map_id: RwLock::new(DEFAULT_PREVIEW_BASE_MAP_ID.to_string()),
                previewed_item_id: RwLock::new(None),
                user_properties: RwLock::new(HashMap::new()),
                error_listeners: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }
        }))
    }
}

/// Errors building a [`Terria`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to create the catalog root: {0}")]
    Catalog(#[from] DeveloperError),

    #[error("Failed to create the HTTP fetcher: {0}")]
    Fetcher(#[from] FetchError),
}

fn source_error(source: &InitSource, error: TerriaError) -> TerriaError {
    TerriaError::from_error(
        error,
        ErrorOverrides::new().message(ErrorText::key_with(
            "models.terria.loadingInitSourceError2Message",
            [("loadSource", source.display_name())],
        )),
    )
}

/// The application root.
pub struct Terria {
    registry: Arc<ModelRegistry>,
    catalog: Catalog,
    workbench: Workbench,
    timeline_stack: TimelineStack,
    main_viewer: MainViewer,
    fetcher: Arc<dyn JsonFetcher>,
    local_properties: Arc<dyn LocalPropertyStore>,
    parameters: RwLock<ConfigParameters>,
    init_sources: RwLock<Vec<InitSource>>,
    init_source_loader: AsyncLoader,
    cors_domains: RwLock<Vec<String>>,
    elements: RwLock<Map<String, Value>>,
    stories: RwLock<Vec<Value>>,
    base_maps: RwLock<Vec<BaseMap>>,
    init_base_map_id: RwLock<Option<String>>,
    init_base_map_name: RwLock<Option<String>>,
    preview_base_map_id: RwLock<String>,
    previewed_item_id: RwLock<Option<String>>,
    user_properties: RwLock<HashMap<String, String>>,
    error_listeners: RwLock<Vec<(ListenerId, ErrorListener)>>,
    next_listener_id: AtomicU64,
}

impl Terria {
    pub fn builder() -> TerriaBuilder {
        TerriaBuilder::default()
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn workbench(&self) -> &Workbench {
        &self.workbench
    }

    pub fn timeline_stack(&self) -> &TimelineStack {
        &self.timeline_stack
    }

    pub fn main_viewer(&self) -> &MainViewer {
        &self.main_viewer
    }

    /// Current application parameters.
    pub fn parameters(&self) -> ConfigParameters {
        self.parameters.read().clone()
    }

    /// Overlays known keys of a `parameters` object.
    pub fn update_parameters(&self, parameters: &Value) {
        self.parameters.write().update(parameters);
    }

    pub fn app_name(&self) -> String {
        self.parameters.read().app_name.clone()
    }

    pub fn cors_domains(&self) -> Vec<String> {
        self.cors_domains.read().clone()
    }

    /// UI element configuration merged from init data.
    pub fn elements(&self) -> Map<String, Value> {
        self.elements.read().clone()
    }

    pub fn stories(&self) -> Vec<Value> {
        self.stories.read().clone()
    }

    pub fn preview_base_map_id(&self) -> String {
        self.preview_base_map_id.read().clone()
    }

    pub fn previewed_item_id(&self) -> Option<String> {
        self.previewed_item_id.read().clone()
    }

    // Models

    /// Registers a model under its id with optional share keys.
    pub fn add_model(&self, model: ModelRef, share_keys: &[String]) -> Result<(), DeveloperError> {
        self.registry.add_model(model, share_keys)
    }

    pub fn get_model_by_id(&self, id: &str) -> Option<ModelRef> {
        self.registry.get_model_by_id(id)
    }

    pub fn get_model_by_id_or_share_key(&self, id: &str) -> Option<ModelRef> {
        self.registry.get_model_by_id_or_share_key(id)
    }

    pub fn add_share_key(&self, id: &str, share_key: &str) {
        self.registry.add_share_key(id, share_key);
    }

    /// Removes every reference the application holds to `model`.
    pub fn remove_model_references(&self, model: &ModelRef) {
        self.main_viewer.remove_picked_features_for(model);
        self.workbench.remove(model);
        self.timeline_stack.remove(model);
        if let Some(id) = model.unique_id() {
            self.registry.remove_model(id);
        }
    }

    // Properties

    pub fn user_property(&self, key: &str) -> Option<String> {
        self.user_properties.read().get(key).cloned()
    }

    pub fn set_user_property(&self, key: &str, value: &str) {
        self.user_properties
            .write()
            .insert(key.to_string(), value.to_string());
    }

    fn local_key(&self, key: &str) -> String {
        format!("{}.{}", self.app_name(), key)
    }

    /// Reads `appName.key` from the local property store.
    pub fn get_local_property(&self, key: &str) -> Option<String> {
        self.local_properties.get(&self.local_key(key))
    }

    /// Writes `appName.key` to the local property store.
    pub fn set_local_property(&self, key: &str, value: &str) -> bool {
        self.local_properties.set(&self.local_key(key), value)
    }

    // Errors

    /// Registers a callback for errors raised to the user.
    pub fn add_error_event_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TerriaError) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.error_listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_error_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.error_listeners.write();
        let before = listeners.len();
        listeners.retain(|(known, _)| *known != id);
        listeners.len() != before
    }

    /// Shows an error to the user unless it has been shown already.
    ///
    /// Suppressed entirely while the `ignoreErrors` user property is `1`.
    pub fn raise_error_to_user(&self, error: impl Into<ErrorSource>) {
        if self.user_property("ignoreErrors").as_deref() == Some("1") {
            return;
        }
        let error = TerriaError::from_error(error, None);
        if error.raised_to_user() {
            return;
        }
        error.set_raised_to_user(true);
        warn!(title = %error.title(), message = %error.message(), "Error raised to user");

        let listeners: Vec<ErrorListener> = self
            .error_listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&error);
        }
    }

    // Viewer

    /// Marks a renderer as attached, applying deferred viewer state.
    pub fn attach_viewer(&self) {
        self.main_viewer.attach();
    }

    // Init sources

    pub fn init_sources(&self) -> Vec<InitSource> {
        self.init_sources.read().clone()
    }

    /// Registers init sources for the next load.
    pub fn add_init_sources(&self, sources: Vec<InitSource>) {
        if sources.is_empty() {
            return;
        }
        self.init_sources.write().extend(sources);
        self.init_source_loader.invalidate();
    }

    /// Forgets every registered init source.
    pub fn clear_init_sources(&self) {
        self.init_sources.write().clear();
        self.init_source_loader.invalidate();
    }

    pub fn is_loading_init_sources(&self) -> bool {
        self.init_source_loader.is_loading()
    }

    /// Loads and applies init sources, sharing any load in progress.
    pub async fn load_init_sources(&self) -> LoadResult {
        self.init_source_loader.load().await
    }

    async fn force_load_init_sources(self: Arc<Self>) -> LoadResult {
        let sources = self.init_sources();
        info!(count = sources.len(), "Loading init sources");
        let mut errors = Vec::new();

        let this: &Terria = &self;

        let loaded = join_all(sources.iter().map(|source| async move {
            init_source::load_init_source(&source.kind, this.fetcher.as_ref())
                .await
                .map(|data| (source, data))
                .map_err(|e| source_error(source, e))
        }))
        .await;

        let mut documents = Vec::new();
        for result in loaded {
            match result {
                Ok((source, Some(data))) => documents.push((source, data)),
                Ok((_, None)) => {}
                Err(e) => errors.push(e),
            }
        }

        let applied = join_all(documents.into_iter().map(|(source, data)| async move {
            this.apply_init_data(ApplyInitDataOptions::new(data))
                .await
                .map_err(|e| source_error(source, e))
        }))
        .await;
        errors.extend(applied.into_iter().filter_map(Result::err));

        if self.base_maps.read().is_empty() {
            self.process_base_maps(&default_base_maps())
                .catch_error(|e| errors.push(e));
        }

        if self.main_viewer.base_map().is_none() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let terria = Arc::clone(&self);
                    handle.spawn(async move { terria.load_persisted_or_init_base_map().await });
                }
                Err(_) => debug!("No runtime to load the base map on"),
            }
        }

        let parameters = self.parameters();
        if let Some(error) = TerriaError::combine(
            errors,
            ErrorOverrides::new()
                .title(ErrorText::key("models.terria.loadingInitSourcesErrorTitle"))
                .message(ErrorText::key_with(
                    "models.terria.loadingInitSourcesErrorMessage",
                    [
                        ("appName", parameters.app_name.as_str()),
                        ("email", parameters.support_email.as_str()),
                    ],
                )),
        ) {
            self.raise_error_to_user(error);
        }
        Ok(())
    }

    /// Releases the init-source loader.
    pub fn dispose(&self) {
        self.init_source_loader.dispose();
    }
}

impl fmt::Debug for Terria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Terria")
            .field("models", &self.registry.len())
            .field("workbench", &self.workbench.item_ids())
            .field("init_sources", &self.init_sources.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn terria_with(fetcher: StaticFetcher) -> Arc<Terria> {
        Terria::builder().fetcher(Arc::new(fetcher)).build().unwrap()
    }

    fn counting_listener(terria: &Terria) -> (Arc<AtomicUsize>, ListenerId) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = terria.add_error_event_listener(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, id)
    }

    #[test]
    fn test_error_is_raised_to_user_once() {
        let terria = terria_with(StaticFetcher::new());
        let (count, _) = counting_listener(&terria);

        let error = TerriaError::with_title("Oops", "Something failed");
        terria.raise_error_to_user(error.clone());
        terria.raise_error_to_user(error.clone());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(error.raised_to_user());
    }

    #[test]
    fn test_ignore_errors_property_suppresses_listeners() {
        let terria = terria_with(StaticFetcher::new());
        let (count, _) = counting_listener(&terria);

        terria.set_user_property("ignoreErrors", "1");
        terria.raise_error_to_user(TerriaError::with_title("Oops", "Hidden"));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        terria.set_user_property("ignoreErrors", "0");
        terria.raise_error_to_user(TerriaError::with_title("Oops", "Shown"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let terria = terria_with(StaticFetcher::new());
        let (count, id) = counting_listener(&terria);

        assert!(terria.remove_error_event_listener(id));
        assert!(!terria.remove_error_event_listener(id));
        terria.raise_error_to_user(TerriaError::with_title("Oops", "Nobody listens"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_local_properties_are_namespaced_by_app_name() {
        let store = Arc::new(MemoryPropertyStore::new());
        let terria = Terria::builder()
            .fetcher(Arc::new(StaticFetcher::new()))
            .local_properties(store.clone())
            .build()
            .unwrap();

        assert!(terria.set_local_property("basemap", "basemap-darkmatter"));
        assert_eq!(
            store.get("TerriaJS App.basemap").as_deref(),
            Some("basemap-darkmatter")
        );
        assert_eq!(
            terria.get_local_property("basemap").as_deref(),
            Some("basemap-darkmatter")
        );
    }

    #[tokio::test]
    async fn test_added_init_sources_are_loaded_on_next_load() {
        let terria = terria_with(StaticFetcher::new());
        terria.add_init_sources(vec![InitSource::data(
            "first".to_string(),
            json!({"catalog": [{"type": "group", "name": "One"}]}),
        )]);
        terria.load_init_sources().await.unwrap();
        assert!(terria.get_model_by_id("//One").is_some());

        terria.add_init_sources(vec![InitSource::data(
            "second".to_string(),
            json!({"catalog": [{"type": "group", "name": "Two"}]}),
        )]);
        terria.load_init_sources().await.unwrap();
        assert!(terria.get_model_by_id("//Two").is_some());
    }

    #[tokio::test]
    async fn test_failed_sources_are_combined_into_one_raised_error() {
        let terria = terria_with(StaticFetcher::new());
        let raised = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&raised);
        terria.add_error_event_listener(move |e: &TerriaError| sink.lock().push(e.clone()));

        terria.add_init_sources(vec![
            InitSource::url("missing one".to_string(), "missing-1.json"),
            InitSource::url("missing two".to_string(), "missing-2.json"),
        ]);
        terria.load_init_sources().await.unwrap();

        let raised = raised.lock();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].original_error().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_model_references_forgets_model_everywhere() {
        let terria = terria_with(StaticFetcher::new());
        terria.add_init_sources(vec![InitSource::data(
            "layers".to_string(),
            json!({
                "catalog": [{"type": "raster-tiles", "name": "Rain", "url": "https://tiles.example.com/{time}/{z}/{x}/{y}.png"}],
                "workbench": ["//Rain"],
                "timeline": ["//Rain"]
            }),
        )]);
        terria.load_init_sources().await.unwrap();
        let rain = terria.get_model_by_id("//Rain").unwrap();
        assert!(terria.timeline_stack().contains(&rain));

        terria.remove_model_references(&rain);

        assert!(terria.workbench().is_empty());
        assert!(terria.timeline_stack().is_empty());
        assert!(terria.get_model_by_id("//Rain").is_none());
    }

    #[tokio::test]
    async fn test_default_base_maps_are_installed() {
        let terria = terria_with(StaticFetcher::new());
        terria.load_init_sources().await.unwrap();
        let ids: Vec<String> = terria
            .base_maps()
            .iter()
            .filter_map(|b| b.mappable.unique_id().map(str::to_string))
            .collect();
        assert_eq!(
            ids,
            vec!["basemap-positron", "basemap-darkmatter", "basemap-openstreetmap"]
        );
    }
}
