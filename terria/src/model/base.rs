//! The stratified model.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::TerriaError;
use crate::loader::{AsyncLoader, BoxFuture, LoadResult};
use crate::strata::{merge_model_references, merge_trait, CommonStrata, StratumData, StratumOrder, MEMBERS_TRAIT};

use super::capability::{MapItem, ModelBehavior};
use super::registry::ModelRegistry;

/// Shared handle to a model.
pub type ModelRef = Arc<Model>;

/// A catalog entity: an id, a type, and a stack of strata.
///
/// Trait values are never stored merged. [`trait_value`](Self::trait_value)
/// walks the strata from highest to lowest priority on every read, so a
/// write to any stratum is visible immediately.
///
/// Models are always created through [`ModelRegistry`] (or
/// [`duplicate`](Self::duplicate)) and handed around as [`ModelRef`].
pub struct Model {
    unique_id: Option<String>,
    behavior: Arc<dyn ModelBehavior>,
    strata: RwLock<HashMap<String, StratumData>>,
    order: Arc<StratumOrder>,
    registry: Weak<ModelRegistry>,
    known_container_unique_ids: RwLock<Vec<String>>,
    source_reference: RwLock<Option<Weak<Model>>>,
    target: RwLock<Option<ModelRef>>,
    metadata_loader: AsyncLoader,
    map_items_loader: AsyncLoader,
    members_loader: AsyncLoader,
    reference_loader: AsyncLoader,
}

fn detached() -> TerriaError {
    TerriaError::from_error("Model was dropped while loading", None)
}

impl Model {
    pub(crate) fn new(
        unique_id: Option<String>,
        behavior: Arc<dyn ModelBehavior>,
        order: Arc<StratumOrder>,
        registry: Weak<ModelRegistry>,
    ) -> ModelRef {
        let defaults = behavior.defaults();
        let mut strata = HashMap::new();
        if !defaults.is_empty() {
            strata.insert(CommonStrata::DEFAULTS.to_string(), defaults);
        }

        Arc::new_cyclic(|weak: &Weak<Model>| {
            let metadata = weak.clone();
            let map_items = weak.clone();
            let members = weak.clone();
            let reference = weak.clone();

            Model {
                unique_id,
                behavior,
                strata: RwLock::new(strata),
                order,
                registry,
                known_container_unique_ids: RwLock::new(Vec::new()),
                source_reference: RwLock::new(None),
                target: RwLock::new(None),
                metadata_loader: AsyncLoader::new("metadata", move || -> BoxFuture<'static, LoadResult> {
                    let Some(model) = metadata.upgrade() else {
                        return Box::pin(async { Err(detached()) });
                    };
                    let behavior = Arc::clone(&model.behavior);
                    match behavior.as_catalog_member() {
                        Some(member) => member.force_load_metadata(model),
                        None => Box::pin(async { Ok(()) }),
                    }
                }),
                map_items_loader: AsyncLoader::new("map_items", move || -> BoxFuture<'static, LoadResult> {
                    let Some(model) = map_items.upgrade() else {
                        return Box::pin(async { Err(detached()) });
                    };
                    let behavior = Arc::clone(&model.behavior);
                    match behavior.as_mappable() {
                        Some(mappable) => mappable.force_load_map_items(model),
                        None => Box::pin(async { Ok(()) }),
                    }
                }),
                members_loader: AsyncLoader::new("members", move || -> BoxFuture<'static, LoadResult> {
                    let Some(model) = members.upgrade() else {
                        return Box::pin(async { Err(detached()) });
                    };
                    let behavior = Arc::clone(&model.behavior);
                    match behavior.as_group() {
                        Some(group) => group.force_load_members(model),
                        None => Box::pin(async { Ok(()) }),
                    }
                }),
                reference_loader: AsyncLoader::new("reference", move || -> BoxFuture<'static, LoadResult> {
                    let Some(model) = reference.upgrade() else {
                        return Box::pin(async { Err(detached()) });
                    };
                    load_reference_target(model)
                }),
            }
        })
    }

    /// The model's id. Immutable for the life of the model.
    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// The model type name.
    pub fn type_name(&self) -> &'static str {
        self.behavior.type_name()
    }

    pub fn behavior(&self) -> &Arc<dyn ModelBehavior> {
        &self.behavior
    }

    /// The registry this model belongs to, if it is still alive.
    pub fn registry(&self) -> Option<Arc<ModelRegistry>> {
        self.registry.upgrade()
    }

    // ── Strata ──────────────────────────────────────────────────────────

    /// Value of `name` in one stratum only.
    pub fn get_trait(&self, stratum: &str, name: &str) -> Option<Value> {
        self.strata.read().get(stratum)?.get(name).cloned()
    }

    /// Sets `name` in `stratum`, creating the stratum if needed.
    pub fn set_trait(&self, stratum: &str, name: &str, value: Value) {
        self.order.ensure(stratum);
        self.strata
            .write()
            .entry(stratum.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// A copy of one stratum.
    pub fn stratum(&self, stratum: &str) -> Option<StratumData> {
        self.strata.read().get(stratum).cloned()
    }

    /// Replaces a whole stratum.
    pub fn set_stratum(&self, stratum: &str, data: StratumData) {
        self.order.ensure(stratum);
        debug!(model = ?self.unique_id, stratum, "Replacing stratum");
        self.strata.write().insert(stratum.to_string(), data);
    }

    /// Removes a stratum entirely.
    pub fn remove_stratum(&self, stratum: &str) -> Option<StratumData> {
        self.strata.write().remove(stratum)
    }

    /// True if the stratum exists.
    pub fn has_stratum(&self, stratum: &str) -> bool {
        self.strata.read().contains_key(stratum)
    }

    /// Stratum ids from highest to lowest priority.
    pub fn strata_top_to_bottom(&self) -> Vec<String> {
        let strata = self.strata.read();
        self.order
            .sort_top_to_bottom(strata.keys().map(String::as_str))
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Effective value of `name` across all strata.
    pub fn trait_value(&self, name: &str) -> Option<Value> {
        let strata = self.strata.read();
        let ids = self.order.sort_top_to_bottom(strata.keys().map(String::as_str));
        let layers: Vec<&StratumData> = ids.iter().filter_map(|id| strata.get(*id)).collect();
        merge_trait(self.behavior.trait_kind(name), name, &layers)
    }

    pub fn string_trait(&self, name: &str) -> Option<String> {
        match self.trait_value(name)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn bool_trait(&self, name: &str) -> Option<bool> {
        self.trait_value(name)?.as_bool()
    }

    pub fn number_trait(&self, name: &str) -> Option<f64> {
        self.trait_value(name)?.as_f64()
    }

    /// Merged member ids, with removal markers applied.
    pub fn members(&self) -> Vec<String> {
        let strata = self.strata.read();
        let ids = self.order.sort_top_to_bottom(strata.keys().map(String::as_str));
        let layers: Vec<&StratumData> = ids.iter().filter_map(|id| strata.get(*id)).collect();
        merge_model_references(MEMBERS_TRAIT, &layers)
    }

    // ── Common traits ───────────────────────────────────────────────────

    pub fn name(&self) -> Option<String> {
        self.string_trait("name")
    }

    /// Name for messages: the `name` trait, else the id, else the type.
    pub fn display_name(&self) -> String {
        self.name()
            .or_else(|| self.unique_id.clone())
            .unwrap_or_else(|| self.type_name().to_string())
    }

    pub fn is_open(&self) -> bool {
        self.bool_trait("isOpen").unwrap_or(false)
    }

    pub fn is_open_in_workbench(&self) -> bool {
        self.bool_trait("isOpenInWorkbench").unwrap_or(true)
    }

    pub fn keep_on_top(&self) -> bool {
        self.bool_trait("keepOnTop").unwrap_or(false)
    }

    pub fn supports_reordering(&self) -> bool {
        self.bool_trait("supportsReordering").unwrap_or(false)
    }

    pub fn show(&self) -> bool {
        self.bool_trait("show").unwrap_or(true)
    }

    // ── Containers ──────────────────────────────────────────────────────

    /// Ids of groups known to contain this model.
    pub fn known_container_unique_ids(&self) -> Vec<String> {
        self.known_container_unique_ids.read().clone()
    }

    /// Records a container id unless already present.
    pub fn add_known_container_unique_id(&self, id: &str) {
        let mut ids = self.known_container_unique_ids.write();
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }

    // ── Capabilities ────────────────────────────────────────────────────

    pub fn is_catalog_member(&self) -> bool {
        self.behavior.as_catalog_member().is_some()
    }

    pub fn is_mappable(&self) -> bool {
        self.behavior.as_mappable().is_some()
    }

    pub fn is_group(&self) -> bool {
        self.behavior.as_group().is_some()
    }

    pub fn is_reference(&self) -> bool {
        self.behavior.as_reference().is_some()
    }

    pub fn is_chartable(&self) -> bool {
        self.behavior.as_chartable().is_some()
    }

    pub fn is_time_varying(&self) -> bool {
        self.behavior.as_time_varying().is_some()
    }

    /// Map items of a mappable model; empty otherwise.
    pub fn map_items(&self) -> Vec<MapItem> {
        match self.behavior.as_mappable() {
            Some(mappable) => mappable.map_items(self),
            None => Vec::new(),
        }
    }

    // ── References ──────────────────────────────────────────────────────

    /// The resolved target of a reference.
    pub fn target(&self) -> Option<ModelRef> {
        self.target.read().clone()
    }

    /// The reference this model is the target of.
    pub fn source_reference(&self) -> Option<ModelRef> {
        self.source_reference.read().as_ref()?.upgrade()
    }

    pub(crate) fn set_source_reference(&self, reference: Option<&ModelRef>) {
        *self.source_reference.write() = reference.map(Arc::downgrade);
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// Loads metadata if this is a catalog member.
    pub async fn load_metadata(&self) -> LoadResult {
        self.metadata_loader.load().await
    }

    /// Loads map items if this is mappable.
    pub async fn load_map_items(&self) -> LoadResult {
        self.map_items_loader.load().await
    }

    /// Runs the raw member loader. Prefer [`GroupModel::load_members`].
    ///
    /// [`GroupModel::load_members`]: crate::catalog::GroupModel::load_members
    pub(crate) async fn load_members_raw(&self) -> LoadResult {
        self.members_loader.load().await
    }

    pub fn is_loading_members(&self) -> bool {
        self.members_loader.is_loading()
    }

    /// Resolves the target of a reference. A no-op for other models.
    pub async fn load_reference(&self) -> LoadResult {
        self.reference_loader.load().await
    }

    /// Forces members to be reloaded on the next load.
    pub fn invalidate_members(&self) {
        self.members_loader.invalidate();
    }

    /// Creates an unregistered copy of this model with a new id.
    ///
    /// Every stratum is copied. When `source_reference` is given the copy
    /// records it as the reference it stands in for.
    pub fn duplicate(&self, new_id: Option<String>, source_reference: Option<&ModelRef>) -> ModelRef {
        let copy = Model::new(
            new_id,
            Arc::clone(&self.behavior),
            Arc::clone(&self.order),
            self.registry.clone(),
        );
        *copy.strata.write() = self.strata.read().clone();
        copy.set_source_reference(source_reference);
        copy
    }

    /// Releases loader state.
    pub fn dispose(&self) {
        self.metadata_loader.dispose();
        self.map_items_loader.dispose();
        self.members_loader.dispose();
        self.reference_loader.dispose();
    }
}

fn load_reference_target(model: ModelRef) -> BoxFuture<'static, LoadResult> {
    Box::pin(async move {
        let behavior = Arc::clone(&model.behavior);
        let Some(reference) = behavior.as_reference() else {
            return Ok(());
        };
        let previous = model.target();
        let target = reference
            .force_load_reference(Arc::clone(&model), previous)
            .await?;
        if let Some(target) = &target {
            target.set_source_reference(Some(&model));
        }
        *model.target.write() = target;
        Ok(())
    })
}

/// The model itself, or the target of a resolved reference.
pub fn dereference(model: &ModelRef) -> ModelRef {
    model.target().unwrap_or_else(|| Arc::clone(model))
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("unique_id", &self.unique_id)
            .field("type", &self.type_name())
            .field("strata", &self.strata_top_to_bottom())
            .finish()
    }
}
