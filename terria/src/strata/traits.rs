//! Merging trait values across strata.
//!
//! Every function here takes the strata of one model ordered top to bottom
//! (highest priority first) and computes the effective value of a single
//! trait. Nothing is cached; the value is recomputed on every read.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// One stratum's trait values.
pub type StratumData = Map<String, Value>;

/// The name of the member-list trait of groups.
pub const MEMBERS_TRAIT: &str = "members";

/// How the values of a trait combine across strata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraitKind {
    /// The top-most defined value wins. An explicit `null` counts as defined.
    Primitive,
    /// Objects are merged key by key, higher strata winning per leaf.
    Object,
    /// Lists of model ids, concatenated from the top stratum down.
    ///
    /// An entry of the form `{"removed": "<id>"}` hides that id in the rest
    /// of its stratum and in every stratum below.
    ModelReferenceArray,
}

/// Effective value of `name` given strata ordered top to bottom.
pub fn merge_trait(kind: TraitKind, name: &str, strata: &[&StratumData]) -> Option<Value> {
    match kind {
        TraitKind::Primitive => strata.iter().find_map(|s| s.get(name).cloned()),
        TraitKind::Object => merge_object(name, strata),
        TraitKind::ModelReferenceArray => {
            let ids = merge_model_references(name, strata);
            let defined = strata.iter().any(|s| s.contains_key(name));
            defined.then(|| Value::Array(ids.into_iter().map(Value::String).collect()))
        }
    }
}

fn merge_object(name: &str, strata: &[&StratumData]) -> Option<Value> {
    let mut merged: Option<Value> = None;
    for stratum in strata.iter().rev() {
        let Some(value) = stratum.get(name) else {
            continue;
        };
        merged = Some(match (merged, value) {
            (Some(Value::Object(mut below)), Value::Object(above)) => {
                deep_merge(&mut below, above);
                Value::Object(below)
            }
            (_, value) => value.clone(),
        });
    }
    merged
}

/// Overlays `above` onto `below`, recursing into nested objects.
pub fn deep_merge(below: &mut Map<String, Value>, above: &Map<String, Value>) {
    for (key, value) in above {
        match (below.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                below.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Returns the id a model reference entry refers to, ignoring removal markers.
pub fn reference_id(entry: &Value) -> Option<&str> {
    entry.as_str()
}

/// Returns the id hidden by a removal marker entry.
pub fn removed_id(entry: &Value) -> Option<&str> {
    entry.get("removed").and_then(Value::as_str)
}

/// Merged, de-duplicated model ids for a model-reference-array trait.
pub fn merge_model_references(name: &str, strata: &[&StratumData]) -> Vec<String> {
    let mut removed: HashSet<&str> = HashSet::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for stratum in strata {
        let Some(Value::Array(entries)) = stratum.get(name) else {
            continue;
        };
        for entry in entries {
            if let Some(id) = removed_id(entry) {
                removed.insert(id);
            } else if let Some(id) = reference_id(entry) {
                if !removed.contains(id) && seen.insert(id) {
                    out.push(id.to_string());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stratum(value: Value) -> StratumData {
        match value {
            Value::Object(map) => map,
            _ => panic!("stratum must be an object"),
        }
    }

    #[test]
    fn test_primitive_top_most_wins() {
        let user = stratum(json!({"name": "User name"}));
        let definition = stratum(json!({"name": "Definition name", "url": "a"}));
        let strata = [&user, &definition];

        assert_eq!(
            merge_trait(TraitKind::Primitive, "name", &strata),
            Some(json!("User name"))
        );
        assert_eq!(
            merge_trait(TraitKind::Primitive, "url", &strata),
            Some(json!("a"))
        );
        assert_eq!(merge_trait(TraitKind::Primitive, "missing", &strata), None);
    }

    #[test]
    fn test_primitive_null_counts_as_defined() {
        let user = stratum(json!({"name": null}));
        let definition = stratum(json!({"name": "x"}));
        assert_eq!(
            merge_trait(TraitKind::Primitive, "name", &[&user, &definition]),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_object_deep_merge() {
        let user = stratum(json!({"style": {"fill": {"color": "red"}}}));
        let definition = stratum(json!({"style": {"fill": {"color": "blue", "opacity": 0.5}, "width": 2}}));
        let merged = merge_trait(TraitKind::Object, "style", &[&user, &definition]).unwrap();
        assert_eq!(
            merged,
            json!({"fill": {"color": "red", "opacity": 0.5}, "width": 2})
        );
    }

    #[test]
    fn test_object_non_object_above_replaces() {
        let user = stratum(json!({"style": "none"}));
        let definition = stratum(json!({"style": {"width": 2}}));
        let merged = merge_trait(TraitKind::Object, "style", &[&user, &definition]).unwrap();
        assert_eq!(merged, json!("none"));
    }

    #[test]
    fn test_members_concatenate_top_down_without_duplicates() {
        let user = stratum(json!({"members": ["c", "a"]}));
        let definition = stratum(json!({"members": ["a", "b"]}));
        assert_eq!(
            merge_model_references(MEMBERS_TRAIT, &[&user, &definition]),
            vec!["c", "a", "b"]
        );
    }

    #[test]
    fn test_removed_marker_hides_lower_strata_only() {
        let user = stratum(json!({"members": [{"removed": "b"}, "d"]}));
        let definition = stratum(json!({"members": ["a", "b"]}));
        assert_eq!(
            merge_model_references(MEMBERS_TRAIT, &[&user, &definition]),
            vec!["d", "a"]
        );

        let user = stratum(json!({"members": ["b"]}));
        let definition = stratum(json!({"members": [{"removed": "b"}]}));
        assert_eq!(
            merge_model_references(MEMBERS_TRAIT, &[&user, &definition]),
            vec!["b"]
        );
    }

    #[test]
    fn test_members_undefined_when_no_stratum_sets_them() {
        let definition = stratum(json!({"name": "g"}));
        assert_eq!(
            merge_trait(TraitKind::ModelReferenceArray, MEMBERS_TRAIT, &[&definition]),
            None
        );
    }
}
