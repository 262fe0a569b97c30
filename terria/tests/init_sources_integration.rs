//! Integration tests for loading init sources.
//!
//! These tests drive a full [`Terria`] through in-memory init documents:
//! - config → initialization URLs → catalog and workbench
//! - `models` entries that depend on each other
//! - error aggregation and raising
//! - application URL hash handling
//!
//! Run with: `cargo test --test init_sources_integration`

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use terria::catalog::GroupModel;
use terria::fetch::StaticFetcher;
use terria::terria::{InitSource, StartOptions, Terria};
use terria::TerriaError;

// ============================================================================
// Helper Functions
// ============================================================================

const BASE: &str = "https://map.example.com";

fn url(path: &str) -> String {
    format!("{}/{}", BASE, path)
}

fn build(fetcher: StaticFetcher) -> Arc<Terria> {
    Terria::builder()
        .fetcher(Arc::new(fetcher))
        .build()
        .expect("terria should build")
}

/// Collects every error raised to the user.
fn capture_errors(terria: &Terria) -> Arc<Mutex<Vec<TerriaError>>> {
    let raised = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&raised);
    terria.add_error_event_listener(move |e: &TerriaError| sink.lock().push(e.clone()));
    raised
}

fn titles(error: &TerriaError) -> Vec<String> {
    error.flatten().iter().map(TerriaError::title).collect()
}

async fn load_document(terria: &Terria, document: serde_json::Value) {
    terria.add_init_sources(vec![InitSource::data("test document".to_string(), document)]);
    terria
        .load_init_sources()
        .await
        .expect("init source load reports through listeners");
}

// ============================================================================
// Models
// ============================================================================

#[tokio::test]
async fn test_container_is_loaded_before_member() {
    let terria = build(StaticFetcher::new());
    let raised = capture_errors(&terria);

    load_document(
        &terria,
        json!({
            "models": {
                "A": {
                    "type": "raster-tiles",
                    "url": "https://tiles.example.com/{z}/{x}/{y}.png",
                    "knownContainerUniqueIds": ["G"]
                },
                "G": {"type": "group", "members": ["A"]}
            }
        }),
    )
    .await;

    assert!(raised.lock().is_empty(), "unexpected errors: {:?}", raised.lock());

    let group = GroupModel::new(terria.get_model_by_id("G").unwrap()).unwrap();
    let members: Vec<String> = group
        .member_models()
        .iter()
        .filter_map(|m| m.unique_id().map(str::to_string))
        .collect();
    assert_eq!(members, vec!["A"]);

    let a = terria.get_model_by_id("A").unwrap();
    assert!(a.known_container_unique_ids().contains(&"G".to_string()));
}

#[tokio::test]
async fn test_circular_containers_are_reported() {
    let terria = build(StaticFetcher::new());
    let raised = capture_errors(&terria);

    load_document(
        &terria,
        json!({
            "models": {
                "X": {"type": "group", "knownContainerUniqueIds": ["Y"]},
                "Y": {"type": "group", "knownContainerUniqueIds": ["X"]}
            }
        }),
    )
    .await;

    let raised = raised.lock();
    assert_eq!(raised.len(), 1);
    assert!(titles(&raised[0])
        .iter()
        .any(|t| t == "Circular model dependency"));
    assert!(terria.get_model_by_id("X").is_some());
    assert!(terria.get_model_by_id("Y").is_some());
}

#[tokio::test]
async fn test_dereferenced_on_plain_model_is_an_error() {
    let terria = build(StaticFetcher::new());
    let raised = capture_errors(&terria);

    load_document(
        &terria,
        json!({
            "models": {
                "plain": {"type": "group", "dereferenced": {"name": "Nope"}}
            }
        }),
    )
    .await;

    let raised = raised.lock();
    assert_eq!(raised.len(), 1);
    assert!(titles(&raised[0])
        .iter()
        .any(|t| t == "Model cannot be dereferenced"));
}

#[tokio::test]
async fn test_split_reference_loads_its_source() {
    let terria = build(StaticFetcher::new());
    let raised = capture_errors(&terria);

    load_document(
        &terria,
        json!({
            "models": {
                "split": {"type": "split-reference", "splitSourceItemId": "source"},
                "source": {
                    "type": "raster-tiles",
                    "name": "Source",
                    "url": "https://tiles.example.com/{z}/{x}/{y}.png"
                }
            }
        }),
    )
    .await;

    assert!(raised.lock().is_empty(), "unexpected errors: {:?}", raised.lock());
    let split = terria.get_model_by_id("split").unwrap();
    let target = split.target().expect("split reference should resolve");
    assert_eq!(target.string_trait("url").as_deref(), Some("https://tiles.example.com/{z}/{x}/{y}.png"));
}

// ============================================================================
// Workbench
// ============================================================================

#[tokio::test]
async fn test_workbench_and_timeline_from_init_data() {
    let terria = build(StaticFetcher::new());
    let raised = capture_errors(&terria);

    load_document(
        &terria,
        json!({
            "catalog": [
                {"type": "raster-tiles", "name": "Roads", "url": "https://tiles.example.com/roads/{z}/{x}/{y}.png"},
                {"type": "raster-tiles", "name": "Rain", "url": "https://tiles.example.com/rain/{time}/{z}/{x}/{y}.png"}
            ],
            "workbench": ["//Rain", "//Roads", "//Missing"],
            "timeline": ["//Rain"]
        }),
    )
    .await;

    assert!(raised.lock().is_empty(), "unexpected errors: {:?}", raised.lock());
    assert_eq!(terria.workbench().item_ids(), vec!["//Rain", "//Roads"]);

    let timeline: Vec<String> = terria
        .timeline_stack()
        .items()
        .iter()
        .filter_map(|m| m.unique_id().map(str::to_string))
        .collect();
    assert_eq!(timeline, vec!["//Rain"]);
}

#[tokio::test]
async fn test_workbench_item_without_url_is_reported() {
    let terria = build(StaticFetcher::new());
    let raised = capture_errors(&terria);

    load_document(
        &terria,
        json!({
            "catalog": [{"type": "raster-tiles", "name": "Broken"}],
            "workbench": ["//Broken"]
        }),
    )
    .await;

    assert_eq!(raised.lock().len(), 1);
    assert_eq!(terria.workbench().item_ids(), vec!["//Broken"]);
}

#[tokio::test]
async fn test_keep_on_top_item_stays_first() {
    let terria = build(StaticFetcher::new());
    load_document(
        &terria,
        json!({
            "catalog": [
                {"type": "raster-tiles", "name": "Labels", "keepOnTop": true, "url": "https://tiles.example.com/labels/{z}/{x}/{y}.png"},
                {"type": "raster-tiles", "name": "Roads", "url": "https://tiles.example.com/roads/{z}/{x}/{y}.png"}
            ]
        }),
    )
    .await;

    let labels = terria.get_model_by_id("//Labels").unwrap();
    let roads = terria.get_model_by_id("//Roads").unwrap();
    terria.workbench().add(labels).await.unwrap();
    terria.workbench().add(roads).await.unwrap();

    assert_eq!(terria.workbench().item_ids(), vec!["//Labels", "//Roads"]);
}

// ============================================================================
// Init sources
// ============================================================================

#[tokio::test]
async fn test_errors_from_all_sources_are_raised_once() {
    let terria = build(StaticFetcher::new());
    let raised = capture_errors(&terria);

    terria.add_init_sources(vec![
        InitSource::url("first".to_string(), url("missing-1.json")),
        InitSource::data("second".to_string(), json!({"catalog": {"not": "an array"}})),
    ]);
    terria.load_init_sources().await.unwrap();

    let raised = raised.lock();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].original_error().len(), 2);
    assert!(titles(&raised[0]).iter().any(|t| t == "Invalid catalog"));
}

#[tokio::test]
async fn test_fragment_falls_back_through_init_paths() {
    let fetcher = StaticFetcher::new().with(
        url("second/simple.json"),
        json!({"catalog": [{"type": "group", "name": "From second path"}]}),
    );
    let terria = build(fetcher);
    let raised = capture_errors(&terria);
    terria.update_parameters(&json!({"initFragmentPaths": ["first/", "second"]}));

    terria.update_application_url(&format!("{}/#simple", BASE)).await;

    assert!(raised.lock().is_empty(), "unexpected errors: {:?}", raised.lock());
    assert!(terria.get_model_by_id("//From second path").is_some());
}

#[tokio::test]
async fn test_start_applies_config_and_clean_hash() {
    let fetcher = StaticFetcher::new()
        .with(
            url("config.json"),
            json!({
                "parameters": {"appName": "Test Map"},
                "initializationUrls": ["from-config"]
            }),
        )
        .with(
            url("init/from-config.json"),
            json!({"catalog": [{"type": "group", "name": "Config group"}]}),
        )
        .with(
            url("init/from-hash.json"),
            json!({"catalog": [{"type": "group", "name": "Hash group"}]}),
        );
    let terria = build(fetcher);
    let raised = capture_errors(&terria);

    terria
        .start(StartOptions {
            config_url: url("config.json"),
            application_url: Some(format!("{}/index.html#clean&from-hash&mode=2d", BASE)),
        })
        .await;

    assert!(raised.lock().is_empty(), "unexpected errors: {:?}", raised.lock());
    assert_eq!(terria.app_name(), "Test Map");
    assert_eq!(terria.user_property("mode").as_deref(), Some("2d"));
    assert!(terria.get_model_by_id("//Hash group").is_some());
    assert!(terria.get_model_by_id("//Config group").is_none());
}

#[tokio::test]
async fn test_start_reports_missing_config() {
    let terria = build(StaticFetcher::new());
    let raised = capture_errors(&terria);

    terria
        .start(StartOptions {
            config_url: url("config.json"),
            application_url: None,
        })
        .await;

    let raised = raised.lock();
    assert_eq!(raised.len(), 1);
    assert!(raised[0].message().contains("config.json"));
}

#[tokio::test]
async fn test_start_data_in_hash_is_applied() {
    let terria = build(StaticFetcher::new());
    let start = json!({
        "initSources": [{"catalog": [{"type": "group", "name": "Started"}]}]
    })
    .to_string();
    let encoded: String = url::form_urlencoded::byte_serialize(start.as_bytes()).collect();

    terria
        .update_application_url(&format!("{}/#start={}", BASE, encoded))
        .await;

    assert!(terria.get_model_by_id("//Started").is_some());
}
