//! `raster-tiles`: imagery from a URL template.
//!
//! The only concrete imagery type shipped with the engine; it backs the
//! default base maps and is enough to exercise the workbench and viewer
//! plumbing. A `{time}` placeholder in the URL is filled from `currentTime`.

use serde_json::{json, Value};

use crate::error::TerriaError;
use crate::loader::{BoxFuture, LoadResult};
use crate::model::{CatalogMember, MapItem, Mappable, Model, ModelBehavior, ModelRef, TimeVarying};
use crate::strata::StratumData;

/// Tiled imagery layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterTilesCatalogItem;

impl RasterTilesCatalogItem {
    pub const TYPE: &'static str = "raster-tiles";
}

impl ModelBehavior for RasterTilesCatalogItem {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn defaults(&self) -> StratumData {
        match json!({
            "supportsReordering": true,
            "show": true,
            "opacity": 0.8
        }) {
            Value::Object(map) => map,
            _ => StratumData::new(),
        }
    }

    fn as_catalog_member(&self) -> Option<&dyn CatalogMember> {
        Some(self)
    }

    fn as_mappable(&self) -> Option<&dyn Mappable> {
        Some(self)
    }

    fn as_time_varying(&self) -> Option<&dyn TimeVarying> {
        Some(self)
    }
}

impl CatalogMember for RasterTilesCatalogItem {}

impl TimeVarying for RasterTilesCatalogItem {}

impl Mappable for RasterTilesCatalogItem {
    fn force_load_map_items(&self, model: ModelRef) -> BoxFuture<'static, LoadResult> {
        Box::pin(async move {
            match model.string_trait("url") {
                Some(url) if !url.is_empty() => Ok(()),
                _ => Err(TerriaError::with_title(
                    "Invalid raster tiles item",
                    format!("`{}` has no `url`.", model.display_name()),
                )),
            }
        })
    }

    fn map_items(&self, model: &Model) -> Vec<MapItem> {
        let Some(mut url) = model.string_trait("url") else {
            return Vec::new();
        };
        if let Some(time) = self.current_time(model) {
            url = url.replace("{time}", &time);
        }
        vec![MapItem {
            kind: "imagery".to_string(),
            url: Some(url),
            show: model.show(),
            opacity: model.number_trait("opacity").unwrap_or(0.8),
        }]
    }
}
