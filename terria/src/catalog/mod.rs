//! The catalog: its root group, group operations, and built-in model types.
//!
//! | Type              | Capabilities                           |
//! |-------------------|----------------------------------------|
//! | `group`           | catalog member, group                  |
//! | `raster-tiles`    | catalog member, mappable, time-varying |
//! | `split-reference` | reference                              |
//! | `stub`            | catalog member, mappable (no items)    |

#[allow(clippy::module_inception)]
mod catalog;
mod catalog_group;
mod group;
mod raster_tiles;
mod split_reference;
mod stub;

use std::sync::Arc;

pub use catalog::Catalog;
pub use catalog_group::CatalogGroup;
pub use group::GroupModel;
pub use raster_tiles::RasterTilesCatalogItem;
pub use split_reference::SplitItemReference;
pub use stub::StubCatalogItem;

use crate::model::ModelFactory;

/// A factory with every built-in model type registered.
///
/// `stub` is not registered: stubs are only created for unknown types.
pub fn builtin_factory() -> ModelFactory {
    ModelFactory::new()
        .with(Arc::new(CatalogGroup))
        .with(Arc::new(RasterTilesCatalogItem))
        .with(Arc::new(SplitItemReference))
}
