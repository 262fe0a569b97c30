//! `group`: a catalog group whose members come straight from its JSON.

use crate::loader::{BoxFuture, LoadResult};
use crate::model::{CatalogMember, Group, ModelBehavior, ModelRef};

/// A plain catalog group.
///
/// Members are stored in the `members` trait when the group is upserted,
/// so loading members has nothing left to fetch.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogGroup;

impl CatalogGroup {
    pub const TYPE: &'static str = "group";
}

impl ModelBehavior for CatalogGroup {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn as_catalog_member(&self) -> Option<&dyn CatalogMember> {
        Some(self)
    }

    fn as_group(&self) -> Option<&dyn Group> {
        Some(self)
    }
}

impl CatalogMember for CatalogGroup {}

impl Group for CatalogGroup {
    fn force_load_members(&self, _model: ModelRef) -> BoxFuture<'static, LoadResult> {
        Box::pin(async { Ok(()) })
    }
}
