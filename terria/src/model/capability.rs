//! Capabilities a model type may provide.
//!
//! A [`ModelBehavior`] describes one model type. Optional capabilities are
//! exposed through the `as_*` accessors, so callers narrow at runtime:
//!
//! ```ignore
//! if let Some(mappable) = model.behavior().as_mappable() {
//!     mappable.force_load_map_items(model.clone()).await?;
//! }
//! ```
//!
//! Load functions receive an owned [`ModelRef`] and return `'static`
//! futures so they can be stored inside the model's [`AsyncLoader`]s.
//!
//! [`AsyncLoader`]: crate::loader::AsyncLoader

use serde_json::Value;

use crate::error::TerriaError;
use crate::loader::{BoxFuture, LoadResult};
use crate::strata::{StratumData, TraitKind, MEMBERS_TRAIT};

use super::{Model, ModelRef};

/// Behaviour shared by every model of one type.
pub trait ModelBehavior: Send + Sync + 'static {
    /// The type name used in catalog JSON (`"type": "group"`).
    fn type_name(&self) -> &'static str;

    /// Values placed in the `defaults` stratum of new models.
    fn defaults(&self) -> StratumData {
        StratumData::new()
    }

    /// How values of `name` combine across strata.
    fn trait_kind(&self, name: &str) -> TraitKind {
        match name {
            MEMBERS_TRAIT => TraitKind::ModelReferenceArray,
            "style" | "rectangle" | "info" => TraitKind::Object,
            _ => TraitKind::Primitive,
        }
    }

    fn as_catalog_member(&self) -> Option<&dyn CatalogMember> {
        None
    }

    fn as_mappable(&self) -> Option<&dyn Mappable> {
        None
    }

    fn as_group(&self) -> Option<&dyn Group> {
        None
    }

    fn as_reference(&self) -> Option<&dyn Reference> {
        None
    }

    fn as_chartable(&self) -> Option<&dyn Chartable> {
        None
    }

    fn as_time_varying(&self) -> Option<&dyn TimeVarying> {
        None
    }
}

/// A model with metadata (name, description, ...).
pub trait CatalogMember: Send + Sync {
    /// Loads metadata into a load stratum.
    fn force_load_metadata(&self, _model: ModelRef) -> BoxFuture<'static, LoadResult> {
        Box::pin(async { Ok(()) })
    }
}

/// Something the viewer can draw.
#[derive(Debug, Clone, PartialEq)]
pub struct MapItem {
    /// Kind of item, e.g. `"imagery"`.
    pub kind: String,
    /// Source URL or URL template.
    pub url: Option<String>,
    /// Whether the item is currently visible.
    pub show: bool,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
}

/// A model that produces map items.
pub trait Mappable: Send + Sync {
    /// Prepares map items, fetching whatever is needed.
    fn force_load_map_items(&self, model: ModelRef) -> BoxFuture<'static, LoadResult>;

    /// The current map items.
    fn map_items(&self, model: &Model) -> Vec<MapItem>;
}

/// A model with child members.
pub trait Group: Send + Sync {
    /// Populates the `members` trait, usually in a load stratum.
    fn force_load_members(&self, model: ModelRef) -> BoxFuture<'static, LoadResult>;
}

/// A model that stands in for another model.
pub trait Reference: Send + Sync {
    /// Resolves the target. `previous` is the target of the last successful load.
    fn force_load_reference(
        &self,
        model: ModelRef,
        previous: Option<ModelRef>,
    ) -> BoxFuture<'static, Result<Option<ModelRef>, TerriaError>>;
}

/// A model that can be shown in the chart panel.
pub trait Chartable: Send + Sync {
    /// Whether the model currently has chart data.
    fn is_chartable(&self, _model: &Model) -> bool {
        true
    }
}

/// A model whose data changes over time.
pub trait TimeVarying: Send + Sync {
    /// The current time as an ISO8601 string, if any.
    fn current_time(&self, model: &Model) -> Option<String> {
        model.trait_value("currentTime").and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
    }
}
