//! Applying the `models` map of init data.
//!
//! Each entry is one stratum of one model. Entries can depend on each other
//! in two ways, and dependencies are always resolved before the dependent
//! model is upserted:
//!
//! ```text
//!   models.A.knownContainerUniqueIds = ["G"]
//!       G upserted ─► G members loaded ─► A upserted
//!
//!   models.S = { type: "split-reference", splitSourceItemId: "A" }
//!       A upserted ─► S upserted ─► S reference loaded
//! ```
//!
//! Models reached twice through different chains are upserted twice into the
//! same registry entry. A model that depends on itself is reported as an
//! error rather than followed.

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::{GroupModel, SplitItemReference};
use crate::error::{ErrorOverrides, ErrorText, Outcome, TerriaError};
use crate::loader::BoxFuture;
use crate::model::{dereference, update_model_from_json, upsert_model_from_json, ModelRef, UpsertOptions};
use crate::strata::CommonStrata;

use super::Terria;

const DEREFERENCED: &str = "dereferenced";
const KNOWN_CONTAINER_UNIQUE_IDS: &str = "knownContainerUniqueIds";

fn cycle_error(chain: &[String], model_id: &str) -> TerriaError {
    TerriaError::with_title(
        "Circular model dependency",
        format!(
            "`{}` depends on itself: {} -> {}",
            model_id,
            chain.join(" -> "),
            model_id
        ),
    )
}

impl Terria {
    /// Loads one model's stratum from `all_models`, dependencies first.
    ///
    /// Never fails outright: every problem is collected into the returned
    /// outcome's error, which is titled after `model_id`.
    pub fn load_model_stratum<'a>(
        &'a self,
        model_id: &'a str,
        stratum: &'a str,
        all_models: &'a Map<String, Value>,
        replace_stratum: bool,
    ) -> BoxFuture<'a, Outcome<Option<ModelRef>>> {
        self.load_model_stratum_in(model_id, stratum, all_models, replace_stratum, Vec::new())
    }

    fn load_model_stratum_in<'a>(
        &'a self,
        model_id: &'a str,
        stratum: &'a str,
        all_models: &'a Map<String, Value>,
        replace_stratum: bool,
        ancestors: Vec<String>,
    ) -> BoxFuture<'a, Outcome<Option<ModelRef>>> {
        Box::pin(async move {
            let mut errors = Vec::new();
            let result = self
                .apply_model_stratum(model_id, stratum, all_models, replace_stratum, ancestors, &mut errors)
                .await;
            let model = match result {
                Ok(model) => model,
                Err(error) => {
                    errors.push(error);
                    None
                }
            };
            Outcome::new(
                model,
                TerriaError::combine(
                    errors,
                    ErrorText::key_with("models.terria.loadModelErrorMessage", [("model", model_id)]),
                ),
            )
        })
    }

    async fn apply_model_stratum(
        &self,
        model_id: &str,
        stratum: &str,
        all_models: &Map<String, Value>,
        replace_stratum: bool,
        ancestors: Vec<String>,
        errors: &mut Vec<TerriaError>,
    ) -> Result<Option<ModelRef>, TerriaError> {
        if ancestors.iter().any(|a| a == model_id) {
            return Err(cycle_error(&ancestors, model_id));
        }
        let mut chain = ancestors;
        chain.push(model_id.to_string());

        let empty = Value::Object(Map::new());
        let data = all_models.get(model_id).unwrap_or(&empty);
        let Some(data) = data.as_object() else {
            return Err(TerriaError::with_title(
                "Invalid model traits",
                "The traits of a model must be a JSON object.",
            ));
        };

        let mut clean = data.clone();
        clean.remove(DEREFERENCED);
        clean.remove(KNOWN_CONTAINER_UNIQUE_IDS);

        let container_ids: Vec<&str> = data
            .get(KNOWN_CONTAINER_UNIQUE_IDS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        // Containers first, each with its members loaded.
        let containers = join_all(container_ids.iter().map(|container_id| {
            let chain = chain.clone();
            async move {
                let mut container_errors = Vec::new();
                let container = self
                    .load_model_stratum_in(container_id, stratum, all_models, replace_stratum, chain)
                    .await
                    .catch_error(|e| {
                        container_errors.push(e.create_parent_error(format!(
                            "Failed to load container {}",
                            container_id
                        )))
                    });
                if let Some(group) = container.map(|c| dereference(&c)).and_then(GroupModel::new) {
                    if let Err(e) = group.load_members().await {
                        container_errors.push(TerriaError::from_error(
                            e,
                            ErrorOverrides::from(format!(
                                "Failed to load group {}",
                                group.unique_id().unwrap_or_default()
                            )),
                        ));
                    }
                }
                container_errors
            }
        }))
        .await;
        errors.extend(containers.into_iter().flatten());

        // A split reference needs its source item.
        let split_source = (clean.get("type").and_then(Value::as_str) == Some(SplitItemReference::TYPE))
            .then(|| clean.get(SplitItemReference::SOURCE_TRAIT).and_then(Value::as_str))
            .flatten();
        if let Some(source_id) = split_source {
            self.load_model_stratum_in(source_id, stratum, all_models, replace_stratum, chain.clone())
                .await
                .catch_error(|e| {
                    errors.push(e.create_parent_error(format!(
                        "Failed to load SplitItemReference {}",
                        source_id
                    )))
                });
        }

        clean.insert("id".to_string(), Value::String(model_id.to_string()));
        let loaded = upsert_model_from_json(
            &self.registry,
            Some(crate::catalog::Catalog::ROOT_ID),
            stratum,
            &Value::Object(clean),
            UpsertOptions {
                replace_stratum,
                match_by_share_key: true,
            },
        )
        .catch_error(|e| errors.push(e));

        let Some(model) = loaded else {
            return Ok(None);
        };
        debug!(model = %model_id, stratum, "Applied model stratum");

        for container_id in &container_ids {
            model.add_known_container_unique_id(container_id);
        }

        // Replacing a stratum of an already dereferenced model must also
        // replace the target's stratum, even without new data for it.
        let mut dereferenced = data.get(DEREFERENCED).cloned();
        if replace_stratum && dereferenced.is_none() && model.is_reference() && model.target().is_some() {
            dereferenced = Some(Value::Object(Map::new()));
        }

        if model.is_reference() {
            if let Err(e) = model.load_reference().await {
                errors.push(TerriaError::from_error(
                    e,
                    ErrorOverrides::from(format!(
                        "Failed to load reference {}",
                        model.unique_id().unwrap_or_default()
                    )),
                ));
            }
            if let Some(target) = model.target() {
                let json = dereferenced.unwrap_or_else(|| Value::Object(Map::new()));
                update_model_from_json(&target, stratum, &json, replace_stratum).catch_error(|e| {
                    errors.push(TerriaError::from_error(
                        e,
                        ErrorOverrides::from(format!(
                            "Failed to update model from JSON: {}",
                            target.unique_id().unwrap_or_default()
                        )),
                    ))
                });
            }
        } else if dereferenced.is_some() {
            return Err(TerriaError::with_title(
                "Model cannot be dereferenced",
                "The stratum has a `dereferenced` property, but the model cannot be dereferenced.",
            ));
        }

        if let Some(group) = GroupModel::new(dereference(&model)) {
            if let Err(e) = group.open(group.is_open(), CommonStrata::USER).await {
                errors.push(TerriaError::from_error(
                    e,
                    ErrorOverrides::from(format!(
                        "Failed to open group {}",
                        group.unique_id().unwrap_or_default()
                    )),
                ));
            }
        }

        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use serde_json::json;
    use std::sync::Arc;

    fn terria() -> Arc<Terria> {
        Terria::builder()
            .fetcher(Arc::new(StaticFetcher::new()))
            .build()
            .unwrap()
    }

    fn models(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_container_members_visible_when_member_resolves() {
        let terria = terria();
        let all = models(json!({
            "A": {"type": "group", "knownContainerUniqueIds": ["G"]},
            "G": {"type": "group", "members": ["A"]}
        }));

        let (model, error) = terria
            .load_model_stratum("A", CommonStrata::DEFINITION, &all, false)
            .await
            .into_parts();

        assert!(error.is_none(), "unexpected error: {:?}", error);
        let a = model.unwrap();
        let group = GroupModel::new(terria.get_model_by_id("G").unwrap()).unwrap();
        assert!(group.member_models().iter().any(|m| Arc::ptr_eq(m, &a)));
        assert_eq!(a.known_container_unique_ids(), vec!["G".to_string()]);
        assert!(a.stratum(CommonStrata::DEFINITION).unwrap().get(KNOWN_CONTAINER_UNIQUE_IDS).is_none());
    }

    #[tokio::test]
    async fn test_self_container_is_a_cycle_error() {
        let terria = terria();
        let all = models(json!({
            "loop": {"type": "group", "knownContainerUniqueIds": ["loop"]}
        }));

        let (model, error) = terria
            .load_model_stratum("loop", CommonStrata::DEFINITION, &all, false)
            .await
            .into_parts();

        assert!(model.is_some());
        let titles: Vec<String> = error.unwrap().flatten().iter().map(TerriaError::title).collect();
        assert!(titles.iter().any(|t| t == "Circular model dependency"));
    }

    #[tokio::test]
    async fn test_non_object_traits_are_rejected() {
        let terria = terria();
        let all = models(json!({"bad": ["not", "an", "object"]}));

        let (model, error) = terria
            .load_model_stratum("bad", CommonStrata::DEFINITION, &all, false)
            .await
            .into_parts();

        assert!(model.is_none());
        assert!(error.is_some());
        assert!(terria.get_model_by_id("bad").is_none());
    }

    #[tokio::test]
    async fn test_dereferenced_traits_reach_the_target() {
        let terria = terria();
        let all = models(json!({
            "source": {"type": "raster-tiles", "name": "Source", "url": "https://tiles.example.com/{z}/{x}/{y}.png"},
            "split": {
                "type": "split-reference",
                "splitSourceItemId": "source",
                "dereferenced": {"opacity": 0.3}
            }
        }));

        let (model, error) = terria
            .load_model_stratum("split", CommonStrata::USER, &all, false)
            .await
            .into_parts();

        assert!(error.is_none(), "unexpected error: {:?}", error);
        let target = model.unwrap().target().unwrap();
        assert_eq!(target.number_trait("opacity"), Some(0.3));
        assert!(terria.get_model_by_id("source").is_some());
    }

    #[tokio::test]
    async fn test_replace_stratum_drops_previous_traits() {
        let terria = terria();
        let first = models(json!({"g": {"type": "group", "name": "First", "description": "old"}}));
        let second = models(json!({"g": {"type": "group", "name": "Second"}}));

        terria
            .load_model_stratum("g", CommonStrata::USER, &first, false)
            .await
            .throw_if_error()
            .unwrap();
        let model = terria
            .load_model_stratum("g", CommonStrata::USER, &second, true)
            .await
            .throw_if_error()
            .unwrap()
            .unwrap();

        assert_eq!(model.name().as_deref(), Some("Second"));
        assert!(model.get_trait(CommonStrata::USER, "description").is_none());
    }

    #[tokio::test]
    async fn test_replace_stratum_clears_dereferenced_target() {
        let terria = terria();
        let first = models(json!({
            "source": {"type": "raster-tiles", "url": "https://tiles.example.com/{z}/{x}/{y}.png"},
            "split": {
                "type": "split-reference",
                "splitSourceItemId": "source",
                "dereferenced": {"opacity": 0.3}
            }
        }));
        let second = models(json!({
            "split": {"type": "split-reference", "splitSourceItemId": "source"}
        }));

        let split = terria
            .load_model_stratum("split", CommonStrata::USER, &first, false)
            .await
            .throw_if_error()
            .unwrap()
            .unwrap();
        let target = split.target().unwrap();
        assert_eq!(target.number_trait("opacity"), Some(0.3));

        terria
            .load_model_stratum("split", CommonStrata::USER, &second, true)
            .await
            .throw_if_error()
            .unwrap();

        let target = split.target().unwrap();
        assert_eq!(target.stratum(CommonStrata::USER), Some(Map::new()));
        assert_eq!(target.number_trait("opacity"), Some(0.8));
    }
}
