//! `stub`: placeholder for models of unknown type.

use crate::loader::{BoxFuture, LoadResult};
use crate::model::{CatalogMember, MapItem, Mappable, Model, ModelBehavior, ModelRef};

/// Stands in for a model whose type could not be created.
///
/// Keeping a stub registered means ids in the workbench or in other
/// groups still resolve; it simply draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubCatalogItem;

impl StubCatalogItem {
    pub const TYPE: &'static str = "stub";
}

impl ModelBehavior for StubCatalogItem {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn as_catalog_member(&self) -> Option<&dyn CatalogMember> {
        Some(self)
    }

    fn as_mappable(&self) -> Option<&dyn Mappable> {
        Some(self)
    }
}

impl CatalogMember for StubCatalogItem {}

impl Mappable for StubCatalogItem {
    fn force_load_map_items(&self, _model: ModelRef) -> BoxFuture<'static, LoadResult> {
        Box::pin(async { Ok(()) })
    }

    fn map_items(&self, _model: &Model) -> Vec<MapItem> {
        Vec::new()
    }
}
