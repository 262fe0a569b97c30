//! Creating and updating models from catalog JSON.
//!
//! ```text
//!  json ──► resolve id ──► existing model? ──no──► factory.create(type)
//!            │                 │                      │ unknown type
//!            │                 │                      ▼
//!            │                 │                 stub + "Unknown type" error
//!            │                 ▼
//!            │          replace stratum? ──► clear it
//!            ▼
//!     update_model_from_json(stratum)
//!        └── object entries of `members` are upserted recursively
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::StubCatalogItem;
use crate::error::{ErrorOverrides, ErrorText, Outcome, TerriaError};
use crate::strata::{CommonStrata, StratumData, MEMBERS_TRAIT};

use super::base::ModelRef;
use super::registry::ModelRegistry;

/// Keys consumed by upsert itself and never stored as traits.
const RESERVED_KEYS: [&str; 4] = ["id", "type", "localId", "shareKeys"];

/// Options for [`upsert_model_from_json`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertOptions {
    /// Clear the stratum before applying the JSON.
    pub replace_stratum: bool,
    /// Treat the resolved id as a share key when no model has that id.
    pub match_by_share_key: bool,
}

fn missing_id_error() -> TerriaError {
    TerriaError::with_title(
        ErrorText::key("models.catalog.idForMatchingErrorTitle"),
        ErrorText::key("models.catalog.idForMatchingErrorMessage"),
    )
}

fn local_id(json: &Map<String, Value>) -> Option<String> {
    json.get("localId")
        .and_then(Value::as_str)
        .or_else(|| json.get("name").and_then(Value::as_str))
        .map(str::to_string)
}

/// Creates or updates the model described by `json`.
///
/// The id comes from `id`, else from `parent_id + "/" + (localId | name)`.
/// Unknown types produce a stub model (so the id still resolves) and an
/// error. The returned model is `None` only when no id could be derived.
pub fn upsert_model_from_json(
    registry: &Arc<ModelRegistry>,
    parent_id: Option<&str>,
    stratum: &str,
    json: &Value,
    options: UpsertOptions,
) -> Outcome<Option<ModelRef>> {
    let Some(object) = json.as_object() else {
        return Outcome::from_error(TerriaError::from_error(
            format!("Expected a JSON object but got `{}`", json),
            None,
        ));
    };

    let mut errors = Vec::new();

    let mut unique_id = match object.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => match local_id(object) {
            Some(local) => format!("{}/{}", parent_id.unwrap_or(""), local),
            None => return Outcome::from_error(missing_id_error()),
        },
    };

    let mut model = registry.get_model_by_id(&unique_id);
    if model.is_none() && options.match_by_share_key {
        if let Some(id) = registry.get_model_id_by_share_key(&unique_id) {
            model = registry.get_model_by_id(&id);
            unique_id = id;
        }
    }

    let model = match model {
        Some(model) => model,
        None => {
            let type_name = object.get("type").and_then(Value::as_str).unwrap_or("");
            let model = match registry.create_model(type_name, Some(unique_id.clone())) {
                Some(model) => model,
                None => {
                    errors.push(TerriaError::with_title(
                        ErrorText::key("models.catalog.unsupportedTypeTitle"),
                        ErrorText::key_with(
                            "models.catalog.unsupportedTypeMessage",
                            [("type", type_name)],
                        ),
                    ));
                    let stub = registry
                        .create_with_behavior(Arc::new(StubCatalogItem), Some(unique_id.clone()));
                    stub.set_trait(
                        CommonStrata::UNDERRIDE,
                        "isExperiencingIssues",
                        Value::Bool(true),
                    );
                    stub.set_trait(
                        CommonStrata::OVERRIDE,
                        "name",
                        Value::String(format!("{} (Stub)", unique_id)),
                    );
                    stub
                }
            };
            let share_keys: Vec<String> = object
                .get("shareKeys")
                .and_then(Value::as_array)
                .map(|keys| {
                    keys.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if let Err(e) = registry.add_model(Arc::clone(&model), &share_keys) {
                errors.push(TerriaError::from_error(
                    e,
                    ErrorOverrides::from(format!("Failed to add model `{}`", unique_id)),
                ));
            }
            debug!(model = %unique_id, type_name = model.type_name(), "Created model");
            model
        }
    };

    if options.replace_stratum {
        model.remove_stratum(stratum);
    }

    update_model_from_json(&model, stratum, json, options.replace_stratum)
        .catch_error(|error| errors.push(error));

    Outcome::new(
        Some(model),
        TerriaError::combine(errors, format!("Error upserting model JSON: `{}`", unique_id)),
    )
}

/// Applies `json` to one stratum of `model`.
///
/// Reserved keys (`id`, `type`, `localId`, `shareKeys`) are skipped. Object
/// entries in `members` are upserted as models under this model's id and
/// stored as their ids.
pub fn update_model_from_json(
    model: &ModelRef,
    stratum: &str,
    json: &Value,
    replace_stratum: bool,
) -> Outcome<()> {
    let Some(object) = json.as_object() else {
        return Outcome::new(
            (),
            Some(TerriaError::from_error(
                format!("Cannot update model `{}` from non-object JSON", model.display_name()),
                None,
            )),
        );
    };

    let mut errors = Vec::new();
    let mut data: StratumData = if replace_stratum {
        StratumData::new()
    } else {
        model.stratum(stratum).unwrap_or_default()
    };

    for (key, value) in object {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if key == MEMBERS_TRAIT {
            match members_from_json(model, stratum, value) {
                Ok((ids, error)) => {
                    errors.extend(error);
                    data.insert(key.clone(), Value::Array(ids));
                }
                Err(error) => errors.push(error),
            }
            continue;
        }
        data.insert(key.clone(), value.clone());
    }

    model.set_stratum(stratum, data);

    Outcome::new((), TerriaError::combine(errors, "Error updating model from JSON"))
}

/// Converts a `members` JSON array into stored references.
fn members_from_json(
    model: &ModelRef,
    stratum: &str,
    value: &Value,
) -> Result<(Vec<Value>, Option<TerriaError>), TerriaError> {
    let Value::Array(entries) = value else {
        return Err(TerriaError::from_error(
            format!("`members` of `{}` must be an array", model.display_name()),
            None,
        ));
    };
    let registry = model
        .registry()
        .ok_or_else(|| TerriaError::from_error("Model registry is no longer available", None))?;

    let mut errors = Vec::new();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::String(_) => out.push(entry.clone()),
            Value::Object(map) if map.contains_key("removed") => out.push(entry.clone()),
            Value::Object(_) => {
                let (member, error) = upsert_model_from_json(
                    &registry,
                    model.unique_id(),
                    stratum,
                    entry,
                    UpsertOptions::default(),
                )
                .into_parts();
                errors.extend(error);
                if let Some(id) = member.as_ref().and_then(|m| m.unique_id()) {
                    out.push(Value::String(id.to_string()));
                }
            }
            other => errors.push(TerriaError::from_error(
                format!("Invalid member `{}`", other),
                None,
            )),
        }
    }
    Ok((out, TerriaError::combine(errors, "Error loading members")))
}
