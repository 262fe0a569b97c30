//! Terria - catalog and model resolution engine
//!
//! Turns declarative catalog JSON ("init sources") into live, stratified
//! models, keeps a workbench of active layers in a consistent order, loads
//! group members lazily, and reports load failures as a single error tree.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ terria::Terria        init sources, apply_init_data,         │
//! │                       load_model_stratum, base maps, viewer  │
//! ├───────────────┬───────────────────┬──────────────────────────┤
//! │ workbench     │ catalog           │ config / logging / fetch │
//! │ ordering      │ root, GroupModel, │                          │
//! │               │ built-in types    │                          │
//! ├───────────────┴───────────────────┴──────────────────────────┤
//! │ model         Model, ModelRegistry, upsert, capabilities     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ strata        StratumOrder, trait merging                    │
//! │ loader        AsyncLoader                                    │
//! │ error         TerriaError, Outcome, DeveloperError           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use terria::fetch::StaticFetcher;
//! use terria::terria::{InitSource, Terria};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let terria = Terria::builder()
//!     .fetcher(Arc::new(StaticFetcher::new()))
//!     .build()?;
//! terria.add_init_sources(vec![InitSource::data(
//!     "inline".to_string(),
//!     json!({
//!         "catalog": [{"type": "group", "name": "Layers"}],
//!         "workbench": []
//!     }),
//! )]);
//! terria.load_init_sources().await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod logging;
pub mod model;
pub mod strata;
pub mod terria;
pub mod workbench;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::{DeveloperError, Outcome, TerriaError};
pub use model::{Model, ModelRef, ModelRegistry};
pub use terria::Terria;
pub use workbench::Workbench;
