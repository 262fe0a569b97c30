//! `split-reference`: a reference that resolves to a copy of another item.
//!
//! Used for the right-hand side of the splitter: the reference's target is
//! a duplicate of `splitSourceItemId` carrying the reference's own id. The
//! duplicate is never registered; it is reachable only through the
//! reference.

use crate::error::TerriaError;
use crate::loader::BoxFuture;
use crate::model::{dereference, ModelBehavior, ModelRef, Reference};

/// Reference resolving to a duplicate of its source item.
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitItemReference;

impl SplitItemReference {
    pub const TYPE: &'static str = "split-reference";
    /// Trait naming the item to duplicate.
    pub const SOURCE_TRAIT: &'static str = "splitSourceItemId";
}

fn split_error(message: String) -> TerriaError {
    TerriaError::with_title("Failed to split", message)
}

impl ModelBehavior for SplitItemReference {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn as_reference(&self) -> Option<&dyn Reference> {
        Some(self)
    }
}

impl Reference for SplitItemReference {
    fn force_load_reference(
        &self,
        model: ModelRef,
        _previous: Option<ModelRef>,
    ) -> BoxFuture<'static, Result<Option<ModelRef>, TerriaError>> {
        Box::pin(async move {
            let (Some(source_id), Some(id)) = (
                model.string_trait(Self::SOURCE_TRAIT),
                model.unique_id().map(str::to_string),
            ) else {
                return Err(split_error(
                    "`splitSourceItemId` and `uniqueId` must be defined".to_string(),
                ));
            };
            let registry = model
                .registry()
                .ok_or_else(|| split_error("Model registry is no longer available".to_string()))?;
            let source = registry
                .get_model_by_id_or_share_key(&source_id)
                .ok_or_else(|| split_error(format!("Could not find source item `{}`", source_id)))?;

            if source.is_reference() {
                source.load_reference().await?;
            }
            let source = dereference(&source);
            Ok(Some(source.duplicate(Some(id), Some(&model))))
        })
    }
}
