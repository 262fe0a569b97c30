//! The workbench: the ordered list of active items.
//!
//! Order is rendering order, first item on top. Two traits constrain where
//! a new item may go:
//!
//! ```text
//!   ┌──────────────────────────────┐
//!   │ not reorderable, keepOnTop   │
//!   │ not reorderable              │
//!   ├──────────────────────────────┤
//!   │ reorderable, keepOnTop       │
//!   │ reorderable                  │
//!   └──────────────────────────────┘
//! ```
//!
//! Insertion first moves the requested index to the right reorderability
//! block, then to the right `keepOnTop` sub-block within it. Lists built by
//! hand through [`Workbench::set_items`] are taken as given and not
//! repaired.
//!
//! References are stored as themselves; [`Workbench::items`] yields their
//! resolved targets. A reference and its target never both appear.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TerriaError;
use crate::loader::BoxFuture;
use crate::model::{dereference, ModelRef};
use crate::strata::CommonStrata;

/// Ordered list of active items.
#[derive(Debug, Default)]
pub struct Workbench {
    items: RwLock<Vec<ModelRef>>,
}

fn same_item(a: &ModelRef, b: &ModelRef) -> bool {
    Arc::ptr_eq(a, b) || Arc::ptr_eq(&dereference(a), &dereference(b))
}

impl Workbench {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items with references replaced by their targets.
    pub fn items(&self) -> Vec<ModelRef> {
        self.items.read().iter().map(dereference).collect()
    }

    /// Replaces the whole list as given.
    pub fn set_items(&self, items: Vec<ModelRef>) {
        *self.items.write() = items;
    }

    /// Ids of the stored items (references keep their own ids).
    pub fn item_ids(&self) -> Vec<String> {
        self.items
            .read()
            .iter()
            .filter_map(|item| item.unique_id().map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// True when every item is collapsed.
    pub fn should_expand_all(&self) -> bool {
        self.items
            .read()
            .iter()
            .all(|item| !item.is_open_in_workbench())
    }

    /// Position of `item` or of anything with the same resolved target.
    pub fn index_of(&self, item: &ModelRef) -> Option<usize> {
        self.items().iter().position(|model| same_item(model, item))
    }

    pub fn contains(&self, item: &ModelRef) -> bool {
        self.index_of(item).is_some()
    }

    /// Removes `item` or anything with the same resolved target.
    pub fn remove(&self, item: &ModelRef) {
        let mut items = self.items.write();
        if let Some(index) = items.iter().position(|model| same_item(model, item)) {
            let removed = items.remove(index);
            debug!(item = ?removed.unique_id(), "Removed workbench item");
        }
    }

    pub fn remove_all(&self) {
        self.items.write().clear();
    }

    /// Collapses every item in the user stratum.
    pub fn collapse_all(&self) {
        self.set_open_in_workbench(false);
    }

    /// Expands every item in the user stratum.
    pub fn expand_all(&self) {
        self.set_open_in_workbench(true);
    }

    fn set_open_in_workbench(&self, open: bool) {
        for item in self.items.read().iter() {
            item.set_trait(CommonStrata::USER, "isOpenInWorkbench", Value::Bool(open));
        }
    }

    /// Moves an item through the ordering rules to `new_index`.
    ///
    /// Does nothing if the item is absent.
    pub fn move_item_to_index(&self, item: &ModelRef, new_index: usize) {
        if !self.contains(item) {
            return;
        }
        self.remove(item);
        self.insert_item(item, new_index);
    }

    fn insert_item(&self, item: &ModelRef, index: usize) {
        let mut stored = self.items.write();
        let items: Vec<ModelRef> = stored.iter().map(dereference).collect();
        if items.iter().any(|model| same_item(model, item)) {
            return;
        }

        let target = dereference(item);
        let reorderable = target.supports_reordering();
        let mut index = index.min(items.len());

        if reorderable {
            while index < items.len() && !items[index].supports_reordering() {
                index += 1;
            }
        } else {
            while index > 0 && items[index - 1].supports_reordering() {
                index -= 1;
            }
        }

        if !target.keep_on_top() {
            while index < items.len()
                && items[index].keep_on_top()
                && items[index].supports_reordering() == reorderable
            {
                index += 1;
            }
        } else {
            while index > 0
                && !items[index - 1].keep_on_top()
                && items[index - 1].supports_reordering() == reorderable
            {
                index -= 1;
            }
        }

        let entry = item.source_reference().unwrap_or_else(|| Arc::clone(item));
        debug!(item = ?entry.unique_id(), index, "Inserted workbench item");
        stored.insert(index, entry);
    }

    /// Adds an item and loads what it needs to be shown.
    ///
    /// The item is inserted before anything is loaded. References are
    /// resolved first: a target that is a group but neither mappable nor
    /// chartable is taken off again, any other target is added in the
    /// reference's place. If loading fails the item is removed and the
    /// error returned.
    pub fn add(&self, item: ModelRef) -> BoxFuture<'_, Result<(), TerriaError>> {
        Box::pin(async move {
            self.insert_item(&item, 0);

            match self.load_added(&item).await {
                Ok(()) => Ok(()),
                Err(error) => {
                    warn!(item = ?item.unique_id(), error = %error, "Failed to add workbench item");
                    self.remove(&item);
                    Err(error)
                }
            }
        })
    }

    async fn load_added(&self, item: &ModelRef) -> Result<(), TerriaError> {
        if item.is_reference() {
            item.load_reference().await?;
            if let Some(target) = item.target() {
                if target.is_group() && !target.is_mappable() && !target.is_chartable() {
                    self.remove(item);
                    return Ok(());
                }
                return self.add(target).await;
            }
        }
        if item.is_catalog_member() {
            item.load_metadata().await?;
        }
        if item.is_mappable() {
            item.load_map_items().await?;
        }
        Ok(())
    }

    /// Adds several items so that they end up in the given order.
    ///
    /// Items are inserted in reverse; each lands at the top subject to the
    /// ordering rules. Every item is attempted; the first error is returned.
    pub async fn add_all(&self, items: Vec<ModelRef>) -> Result<(), TerriaError> {
        let results = join_all(items.into_iter().rev().map(|item| self.add(item))).await;
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_factory;
    use crate::model::{Chartable, Group, ModelBehavior, ModelRegistry};
    use serde_json::json;

    fn registry() -> Arc<ModelRegistry> {
        ModelRegistry::new(builtin_factory())
    }

    fn layer(registry: &Arc<ModelRegistry>, id: &str, keep_on_top: bool, reorderable: bool) -> ModelRef {
        let model = registry.create_model("raster-tiles", Some(id.into())).unwrap();
        model.set_trait(CommonStrata::DEFINITION, "url", json!(format!("https://tiles/{}", id)));
        model.set_trait(CommonStrata::DEFINITION, "keepOnTop", json!(keep_on_top));
        model.set_trait(CommonStrata::DEFINITION, "supportsReordering", json!(reorderable));
        registry.add_model(Arc::clone(&model), &[]).unwrap();
        model
    }

    fn abc(registry: &Arc<ModelRegistry>) -> (ModelRef, ModelRef, ModelRef) {
        (
            layer(registry, "A", false, true),
            layer(registry, "B", false, true),
            layer(registry, "C", false, true),
        )
    }

    #[test]
    fn test_set_items_and_move() {
        let registry = registry();
        let (a, b, c) = abc(&registry);
        let workbench = Workbench::new();
        workbench.set_items(vec![Arc::clone(&a), b, c]);
        assert_eq!(workbench.item_ids(), vec!["A", "B", "C"]);

        workbench.move_item_to_index(&a, 1);
        assert_eq!(workbench.item_ids(), vec!["B", "A", "C"]);

        workbench.move_item_to_index(&a, 2);
        assert_eq!(workbench.item_ids(), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_move_absent_item_is_noop() {
        let registry = registry();
        let (a, b, c) = abc(&registry);
        let workbench = Workbench::new();
        workbench.set_items(vec![a, b]);
        workbench.move_item_to_index(&c, 0);
        assert_eq!(workbench.item_ids(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_add_all_preserves_order() {
        let registry = registry();
        let (a, b, c) = abc(&registry);
        let workbench = Workbench::new();
        workbench.add_all(vec![a, b, c]).await.unwrap();
        assert_eq!(workbench.item_ids(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_keep_on_top_is_pinned() {
        let registry = registry();
        let a = layer(&registry, "A", false, true);
        let b = layer(&registry, "B", false, true);
        let c = layer(&registry, "C", true, true);
        let workbench = Workbench::new();
        workbench.add_all(vec![a, b, c]).await.unwrap();
        assert_eq!(workbench.item_ids(), vec!["C", "A", "B"]);

        let d = layer(&registry, "D", true, true);
        workbench.add(d).await.unwrap();
        assert_eq!(workbench.item_ids(), vec!["D", "C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_plain_item_goes_below_keep_on_top() {
        let registry = registry();
        let a = layer(&registry, "A", false, true);
        let b = layer(&registry, "B", false, true);
        let c = layer(&registry, "C", true, true);
        let workbench = Workbench::new();
        workbench.add_all(vec![a, b, c]).await.unwrap();

        let d = layer(&registry, "D", false, true);
        workbench.add(d).await.unwrap();
        assert_eq!(workbench.item_ids(), vec!["C", "D", "A", "B"]);
    }

    #[tokio::test]
    async fn test_non_reorderable_goes_above_reorderable() {
        let registry = registry();
        let a = layer(&registry, "A", false, true);
        let b = layer(&registry, "B", false, true);
        let c = layer(&registry, "C", false, false);
        let workbench = Workbench::new();
        workbench.add_all(vec![a, b, c]).await.unwrap();
        assert_eq!(workbench.item_ids(), vec!["C", "A", "B"]);

        let c = registry.get_model_by_id("C").unwrap();
        workbench.move_item_to_index(&c, 2);
        assert_eq!(workbench.item_ids(), vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_add_twice_is_idempotent() {
        let registry = registry();
        let (a, b, _) = abc(&registry);
        let workbench = Workbench::new();
        workbench.add(Arc::clone(&a)).await.unwrap();
        workbench.add(b).await.unwrap();
        let before = workbench.item_ids();
        workbench.add(a).await.unwrap();
        assert_eq!(workbench.item_ids(), before);
    }

    #[tokio::test]
    async fn test_failed_map_items_roll_back() {
        let registry = registry();
        let broken = registry.create_model("raster-tiles", Some("broken".into())).unwrap();
        registry.add_model(Arc::clone(&broken), &[]).unwrap();
        let workbench = Workbench::new();

        let err = workbench.add(Arc::clone(&broken)).await.unwrap_err();
        assert_eq!(err.title(), "Invalid raster tiles item");
        assert!(!workbench.contains(&broken));
        assert!(workbench.is_empty());
    }

    #[tokio::test]
    async fn test_reference_is_stored_and_target_exposed() {
        let registry = registry();
        let source = layer(&registry, "source", false, true);
        let split = registry.create_model("split-reference", Some("split".into())).unwrap();
        split.set_trait(CommonStrata::DEFINITION, "splitSourceItemId", json!("source"));
        registry.add_model(Arc::clone(&split), &[]).unwrap();

        let workbench = Workbench::new();
        workbench.add(Arc::clone(&split)).await.unwrap();

        assert_eq!(workbench.len(), 1);
        assert_eq!(workbench.item_ids(), vec!["split"]);
        let target = split.target().unwrap();
        assert!(Arc::ptr_eq(&workbench.items()[0], &target));
        assert!(workbench.contains(&split));
        assert!(workbench.contains(&target));
        assert!(!workbench.contains(&source));

        workbench.remove(&target);
        assert!(workbench.is_empty());
    }

    #[tokio::test]
    async fn test_reference_to_plain_group_is_removed() {
        let registry = registry();
        let group = registry.create_model("group", Some("g".into())).unwrap();
        registry.add_model(group, &[]).unwrap();
        let split = registry.create_model("split-reference", Some("split".into())).unwrap();
        split.set_trait(CommonStrata::DEFINITION, "splitSourceItemId", json!("g"));

        let workbench = Workbench::new();
        workbench.add(Arc::clone(&split)).await.unwrap();
        assert!(workbench.is_empty());
    }

    struct ChartGroup;

    impl ModelBehavior for ChartGroup {
        fn type_name(&self) -> &'static str {
            "chart-group"
        }

        fn as_group(&self) -> Option<&dyn Group> {
            Some(self)
        }

        fn as_chartable(&self) -> Option<&dyn Chartable> {
            Some(self)
        }
    }

    impl Group for ChartGroup {
        fn force_load_members(&self, _model: ModelRef) -> BoxFuture<'static, crate::loader::LoadResult> {
            Box::pin(async { Ok(()) })
        }
    }

    impl Chartable for ChartGroup {}

    #[tokio::test]
    async fn test_reference_to_chartable_group_is_kept() {
        let registry = registry();
        registry.register_type(Arc::new(ChartGroup));
        let chart = registry.create_model("chart-group", Some("chart".into())).unwrap();
        registry.add_model(chart, &[]).unwrap();
        let split = registry.create_model("split-reference", Some("split".into())).unwrap();
        split.set_trait(CommonStrata::DEFINITION, "splitSourceItemId", json!("chart"));

        let workbench = Workbench::new();
        workbench.add(Arc::clone(&split)).await.unwrap();

        let target = split.target().unwrap();
        assert!(target.is_chartable());
        assert_eq!(workbench.len(), 1);
        assert!(Arc::ptr_eq(&workbench.items()[0], &target));
    }

    #[test]
    fn test_collapse_and_expand_all() {
        let registry = registry();
        let (a, b, _) = abc(&registry);
        let workbench = Workbench::new();
        workbench.set_items(vec![Arc::clone(&a), b]);
        assert!(!workbench.should_expand_all());

        workbench.collapse_all();
        assert!(workbench.should_expand_all());
        assert_eq!(a.get_trait(CommonStrata::USER, "isOpenInWorkbench"), Some(json!(false)));

        workbench.expand_all();
        assert!(a.is_open_in_workbench());
    }

    #[test]
    fn test_remove_all() {
        let registry = registry();
        let (a, b, c) = abc(&registry);
        let workbench = Workbench::new();
        workbench.set_items(vec![a, b, c]);
        workbench.remove_all();
        assert!(workbench.is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add { keep_on_top: bool, reorderable: bool },
            Move { item: usize, index: usize },
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (any::<bool>(), any::<bool>())
                    .prop_map(|(keep_on_top, reorderable)| Op::Add { keep_on_top, reorderable }),
                (0usize..16, 0usize..20).prop_map(|(item, index)| Op::Move { item, index }),
            ]
        }

        fn block(model: &ModelRef) -> u8 {
            match (model.supports_reordering(), model.keep_on_top()) {
                (false, true) => 0,
                (false, false) => 1,
                (true, true) => 2,
                (true, false) => 3,
            }
        }

        proptest! {
            #[test]
            fn prop_ordering_blocks_hold(ops in proptest::collection::vec(op(), 1..24)) {
                let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                let registry = registry();
                let workbench = Workbench::new();
                let mut added: Vec<ModelRef> = Vec::new();

                for (n, op) in ops.into_iter().enumerate() {
                    match op {
                        Op::Add { keep_on_top, reorderable } => {
                            let item = layer(&registry, &format!("item-{}", n), keep_on_top, reorderable);
                            runtime.block_on(workbench.add(Arc::clone(&item))).unwrap();
                            added.push(item);
                        }
                        Op::Move { item, index } => {
                            if let Some(item) = added.get(item % added.len().max(1)) {
                                workbench.move_item_to_index(item, index);
                            }
                        }
                    }

                    let blocks: Vec<u8> = workbench.items().iter().map(block).collect();
                    prop_assert!(blocks.windows(2).all(|w| w[0] <= w[1]), "blocks out of order: {:?}", blocks);
                    prop_assert_eq!(workbench.len(), added.len());
                }
            }
        }
    }
}
