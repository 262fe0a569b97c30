//! Base maps offered in the map settings.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ErrorText, Outcome, TerriaError};
use crate::model::{upsert_model_from_json, ModelRef, UpsertOptions};
use crate::strata::CommonStrata;

use super::Terria;

/// Parent id for base map models.
pub const BASE_MAP_PARENT_ID: &str = "/basemap";

/// Default id previewed in the catalog explorer.
pub const DEFAULT_PREVIEW_BASE_MAP_ID: &str = "basemap-positron";

/// A mappable model offered as a base map.
#[derive(Debug, Clone)]
pub struct BaseMap {
    pub mappable: ModelRef,
    /// Thumbnail shown in the base map picker.
    pub image: Option<String>,
}

/// Base maps installed when init data defines none.
pub fn default_base_maps() -> Vec<Value> {
    vec![
        json!({
            "item": {
                "id": "basemap-positron",
                "name": "Positron (Light)",
                "type": "raster-tiles",
                "url": "https://basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png",
                "opacity": 1.0
            },
            "image": "build/TerriaJS/images/positron.png"
        }),
        json!({
            "item": {
                "id": "basemap-darkmatter",
                "name": "Dark Matter",
                "type": "raster-tiles",
                "url": "https://basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png",
                "opacity": 1.0
            },
            "image": "build/TerriaJS/images/dark-matter.png"
        }),
        json!({
            "item": {
                "id": "basemap-openstreetmap",
                "name": "OpenStreetMap",
                "type": "raster-tiles",
                "url": "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
                "opacity": 1.0
            },
            "image": "build/TerriaJS/images/openstreetmap.png"
        }),
    ]
}

fn invalid_base_map(message: String) -> TerriaError {
    TerriaError::with_title("Invalid base map", message)
}

impl Terria {
    /// Base maps in picker order.
    pub fn base_maps(&self) -> Vec<BaseMap> {
        self.base_maps.read().clone()
    }

    /// Upserts each `{item, image}` entry and offers mappable results as
    /// base maps. An entry whose model is already offered replaces it.
    pub fn process_base_maps(&self, entries: &[Value]) -> Outcome<()> {
        let mut errors = Vec::new();

        for entry in entries {
            let Some(item) = entry.get("item") else {
                errors.push(invalid_base_map(format!("Base map entry has no `item`: {}", entry)));
                continue;
            };
            if !item.is_object() {
                errors.push(invalid_base_map(format!("Base map `item` must be an object: {}", item)));
                continue;
            }

            let model = upsert_model_from_json(
                &self.registry,
                Some(BASE_MAP_PARENT_ID),
                CommonStrata::DEFINITION,
                item,
                UpsertOptions::default(),
            )
            .catch_error(|e| errors.push(e));

            let Some(model) = model else {
                continue;
            };
            if !model.is_mappable() {
                errors.push(invalid_base_map(format!(
                    "`{}` cannot be drawn on the map",
                    model.display_name()
                )));
                continue;
            }

            let base_map = BaseMap {
                mappable: model,
                image: entry.get("image").and_then(Value::as_str).map(str::to_string),
            };
            let mut base_maps = self.base_maps.write();
            match base_maps
                .iter()
                .position(|b| b.mappable.unique_id() == base_map.mappable.unique_id())
            {
                Some(index) => base_maps[index] = base_map,
                None => base_maps.push(base_map),
            }
        }

        Outcome::new(
            (),
            TerriaError::combine(errors, ErrorText::key("models.terria.processBaseMapsErrorMessage")),
        )
    }

    /// Picks the base map to show first and hands it to the viewer.
    ///
    /// Preference: the persisted `basemap` property, then the init base map
    /// id, then the init base map name, then the first base map.
    pub async fn load_persisted_or_init_base_map(&self) {
        let chosen = {
            let base_maps = self.base_maps.read();
            let Some(first) = base_maps.first() else {
                debug!("No base maps to choose from");
                return;
            };
            let persisted = self.get_local_property("basemap");
            let init_id = self.init_base_map_id.read().clone();
            let init_name = self.init_base_map_name.read().clone();

            let by_id = |id: &Option<String>| {
                id.as_deref().and_then(|id| {
                    base_maps
                        .iter()
                        .find(|b| b.mappable.unique_id() == Some(id))
                })
            };
            by_id(&persisted)
                .or_else(|| by_id(&init_id))
                .or_else(|| {
                    init_name.as_deref().and_then(|name| {
                        base_maps.iter().find(|b| {
                            b.mappable.is_catalog_member()
                                && b.mappable.name().as_deref() == Some(name)
                        })
                    })
                })
                .unwrap_or(first)
                .mappable
                .clone()
        };

        self.set_base_map(chosen).await;
    }

    /// Loads `base_map`'s map items and makes it the active base map.
    ///
    /// A base map that fails to load is not activated.
    pub async fn set_base_map(&self, base_map: ModelRef) {
        if let Err(error) = base_map.load_map_items().await {
            warn!(base_map = ?base_map.unique_id(), error = %error, "Failed to load base map");
            self.raise_error_to_user(error);
            return;
        }
        if let Some(id) = base_map.unique_id() {
            self.set_local_property("basemap", id);
        }
        debug!(base_map = ?base_map.unique_id(), "Base map set");
        self.main_viewer.set_base_map(Some(base_map));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use std::sync::Arc;

    fn terria() -> Arc<Terria> {
        Terria::builder()
            .fetcher(Arc::new(StaticFetcher::new()))
            .build()
            .unwrap()
    }

    fn ids(terria: &Terria) -> Vec<String> {
        terria
            .base_maps()
            .iter()
            .filter_map(|b| b.mappable.unique_id().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_invalid_entries_are_reported_and_skipped() {
        let terria = terria();
        let (_, error) = terria
            .process_base_maps(&[
                json!({"image": "no-item.png"}),
                json!({"item": {"id": "not-mappable", "type": "group"}}),
                json!({"item": {"id": "tiles", "type": "raster-tiles", "url": "https://t/{z}/{x}/{y}.png"}}),
            ])
            .into_parts();

        assert_eq!(ids(&terria), vec!["tiles"]);
        let error = error.unwrap();
        assert_eq!(error.original_error().len(), 2);
    }

    #[test]
    fn test_same_id_replaces_entry() {
        let terria = terria();
        terria.process_base_maps(&default_base_maps()).ignore_error();
        terria
            .process_base_maps(&[json!({
                "item": {"id": "basemap-darkmatter", "type": "raster-tiles", "url": "https://dark/{z}/{x}/{y}.png"},
                "image": "dark.png"
            })])
            .ignore_error();

        assert_eq!(
            ids(&terria),
            vec!["basemap-positron", "basemap-darkmatter", "basemap-openstreetmap"]
        );
        let dark = &terria.base_maps()[1];
        assert_eq!(dark.image.as_deref(), Some("dark.png"));
        assert_eq!(
            dark.mappable.string_trait("url").as_deref(),
            Some("https://dark/{z}/{x}/{y}.png")
        );
    }

    #[tokio::test]
    async fn test_persisted_base_map_wins_over_first() {
        let terria = terria();
        terria.process_base_maps(&default_base_maps()).ignore_error();
        terria.set_local_property("basemap", "basemap-openstreetmap");

        terria.load_persisted_or_init_base_map().await;

        let active = terria.main_viewer().base_map().unwrap();
        assert_eq!(active.unique_id(), Some("basemap-openstreetmap"));
    }

    #[tokio::test]
    async fn test_base_map_without_url_is_not_activated() {
        let terria = terria();
        terria
            .process_base_maps(&[json!({"item": {"id": "broken", "type": "raster-tiles"}})])
            .ignore_error();

        terria.load_persisted_or_init_base_map().await;

        assert!(terria.main_viewer().base_map().is_none());
        assert!(terria.get_local_property("basemap").is_none());
    }
}
