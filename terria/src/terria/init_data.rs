//! Applying one init-data document.

use std::collections::HashSet;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ErrorOverrides, ErrorText, TerriaError};
use crate::model::ModelRef;
use crate::strata::CommonStrata;

use super::viewer::CameraView;
use super::Terria;

/// Flight time for the initial camera.
const INITIAL_CAMERA_FLIGHT_SECS: f64 = 2.0;

/// Options for [`Terria::apply_init_data`].
#[derive(Debug, Clone, Default)]
pub struct ApplyInitDataOptions {
    pub init_data: Map<String, Value>,
    /// Replace model strata instead of merging into them.
    pub replace_stratum: bool,
    /// Clear picked features when the document has none.
    pub can_unset_feature_picking_state: bool,
}

impl ApplyInitDataOptions {
    pub fn new(init_data: Map<String, Value>) -> Self {
        Self {
            init_data,
            ..Self::default()
        }
    }
}

fn invalid_id_error(list: &str) -> TerriaError {
    TerriaError::with_title(
        format!("Invalid model ID in {}", list),
        format!("A model ID in the {} list is not a string.", list),
    )
}

fn workbench_item_error(model: &ModelRef, error: TerriaError) -> TerriaError {
    let name = if model.is_catalog_member() {
        model.display_name()
    } else {
        model.unique_id().unwrap_or("Unknown item").to_string()
    };
    TerriaError::from_error(
        error,
        ErrorOverrides::new().title(ErrorText::key_with(
            "models.terria.loadingWorkbenchItemErrorTitle",
            [("name", name)],
        )),
    )
}

/// Resolves a workbench entry and loads its map items.
async fn load_workbench_item(item: ModelRef) -> Result<(), TerriaError> {
    let model = if item.is_reference() {
        if let Err(e) = item.load_reference().await {
            return Err(workbench_item_error(&item, e));
        }
        item.target().unwrap_or(item)
    } else {
        item
    };
    if model.is_mappable() {
        model
            .load_map_items()
            .await
            .map_err(|e| workbench_item_error(&model, e))?;
    }
    Ok(())
}

impl Terria {
    /// Applies an init-data document.
    ///
    /// Sections are applied in a fixed order: CORS domains, catalog, UI
    /// elements, stories, viewer mode, base map selection, base maps,
    /// cameras, splitter, model strata, previewed item, workbench, timeline,
    /// workbench map items, and finally picked features. A failing section
    /// does not stop the ones after it; all errors are combined into the
    /// returned error.
    pub async fn apply_init_data(&self, options: ApplyInitDataOptions) -> Result<(), TerriaError> {
        let ApplyInitDataOptions {
            init_data,
            replace_stratum,
            can_unset_feature_picking_state,
        } = options;
        let mut errors = Vec::new();

        let stratum = init_data
            .get("stratum")
            .and_then(Value::as_str)
            .unwrap_or(CommonStrata::DEFINITION)
            .to_string();

        if let Some(domains) = init_data.get("corsDomains").and_then(Value::as_array) {
            self.cors_domains
                .write()
                .extend(domains.iter().filter_map(Value::as_str).map(str::to_string));
        }

        if let Some(catalog) = init_data.get("catalog") {
            match catalog.as_array() {
                Some(members) => self
                    .catalog
                    .group()
                    .add_members_from_json(&stratum, members)
                    .catch_error(|e| errors.push(e)),
                None => errors.push(TerriaError::with_title(
                    "Invalid catalog",
                    "The `catalog` of init data must be an array.",
                )),
            }
        }

        if let Some(elements) = init_data.get("elements").and_then(Value::as_object) {
            let mut current = self.elements.write();
            for (key, value) in elements {
                current.insert(key.clone(), value.clone());
            }
        }

        if let Some(stories) = init_data.get("stories").and_then(Value::as_array) {
            *self.stories.write() = stories.clone();
        }

        if let Some(mode) = init_data.get("viewerMode").and_then(Value::as_str) {
            if !self.main_viewer.apply_mode_name(mode) {
                debug!(mode, "Ignoring unknown viewer mode");
            }
        }

        if let Some(id) = init_data.get("baseMapId").and_then(Value::as_str) {
            *self.init_base_map_id.write() = Some(id.to_string());
        }
        if let Some(name) = init_data.get("baseMapName").and_then(Value::as_str) {
            *self.init_base_map_name.write() = Some(name.to_string());
        }
        if let Some(id) = init_data.get("previewBaseMapId").and_then(Value::as_str) {
            *self.preview_base_map_id.write() = id.to_string();
        } else if let Some(id) = self.init_base_map_id.read().clone() {
            *self.preview_base_map_id.write() = id;
        }

        if let Some(base_maps) = init_data.get("baseMaps").and_then(Value::as_array) {
            if !base_maps.is_empty() {
                self.process_base_maps(base_maps).catch_error(|e| errors.push(e));
            }
        }

        if let Some(camera) = init_data.get("homeCamera").filter(|c| c.is_object()) {
            match CameraView::from_json(camera) {
                Ok(camera) => self.main_viewer.set_home_camera(camera),
                Err(e) => errors.push(e),
            }
        }
        if let Some(camera) = init_data.get("initialCamera").filter(|c| c.is_object()) {
            match CameraView::from_json(camera) {
                Ok(camera) => self.main_viewer.zoom_to(camera, INITIAL_CAMERA_FLIGHT_SECS),
                Err(e) => errors.push(e),
            }
        }

        if let Some(show) = init_data.get("showSplitter").and_then(Value::as_bool) {
            self.main_viewer.set_show_splitter(show);
        }
        if let Some(position) = init_data.get("splitPosition").and_then(Value::as_f64) {
            self.main_viewer.set_split_position(position);
        }

        let workbench: Vec<Value> = init_data
            .get("workbench")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let timeline: Vec<Value> = init_data
            .get("timeline")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if let Some(models) = init_data.get("models").and_then(Value::as_object) {
            let results = join_all(models.keys().map(|model_id| {
                self.load_model_stratum(model_id, &stratum, models, replace_stratum)
            }))
            .await;
            errors.extend(results.into_iter().filter_map(|outcome| outcome.into_parts().1));
        }

        if let Some(id) = init_data.get("previewedItemId").and_then(Value::as_str) {
            *self.previewed_item_id.write() = Some(id.to_string());
        }

        let new_items: Vec<ModelRef> = workbench
            .iter()
            .filter_map(|id| match id.as_str() {
                Some(id) => self.registry.get_model_by_id_or_share_key(id),
                None => {
                    errors.push(invalid_id_error("workbench"));
                    None
                }
            })
            .collect();
        self.workbench.set_items(new_items.clone());

        let timeline_ids: HashSet<String> = timeline
            .iter()
            .filter_map(|id| match id.as_str() {
                Some(id) if self.registry.get_model_by_id(id).is_some() => Some(id.to_string()),
                Some(id) => self.registry.get_model_id_by_share_key(id),
                None => {
                    errors.push(invalid_id_error("timeline"));
                    None
                }
            })
            .collect();
        self.timeline_stack.set_items(
            self.workbench
                .items()
                .into_iter()
                .filter(|item| {
                    item.is_time_varying()
                        && item.unique_id().is_some_and(|id| timeline_ids.contains(id))
                })
                .collect(),
        );

        let loads = join_all(new_items.into_iter().map(load_workbench_item)).await;
        errors.extend(loads.into_iter().filter_map(Result::err));

        match init_data.get("pickedFeatures").and_then(Value::as_object) {
            Some(picked) => self.main_viewer.defer_picked_features(picked.clone()),
            None if can_unset_feature_picking_state => self.main_viewer.clear_picked_features(),
            None => {}
        }

        match TerriaError::combine(
            errors,
            ErrorOverrides::new().title(ErrorText::key("models.terria.loadingInitSourceErrorTitle")),
        ) {
            Some(error) => {
                warn!(error = %error, "Errors applying init data");
                Err(error)
            }
            None => Ok(()),
        }
    }
}
