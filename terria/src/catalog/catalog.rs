//! The catalog root.

use std::sync::Arc;

use serde_json::Value;

use crate::error::DeveloperError;
use crate::model::ModelRegistry;
use crate::strata::CommonStrata;

use super::{CatalogGroup, GroupModel};

/// Owns the root group (`/`) every top-level catalog entry hangs off.
#[derive(Debug, Clone)]
pub struct Catalog {
    group: GroupModel,
}

impl Catalog {
    /// Id of the root group.
    pub const ROOT_ID: &'static str = "/";

    /// Creates and registers the root group.
    pub fn new(registry: &Arc<ModelRegistry>) -> Result<Self, DeveloperError> {
        let model = registry.create_with_behavior(Arc::new(CatalogGroup), Some(Self::ROOT_ID.to_string()));
        model.set_trait(
            CommonStrata::DEFINITION,
            "name",
            Value::String("Root Group".to_string()),
        );
        registry.add_model(Arc::clone(&model), &[])?;
        Ok(Self {
            group: GroupModel::wrap(model),
        })
    }

    /// The root group.
    pub fn group(&self) -> &GroupModel {
        &self.group
    }
}
