//! Models, their capabilities, and the registry that owns them.
//!
//! ```text
//!   ModelRegistry ──owns──► Model (Arc) ──behavior──► dyn ModelBehavior
//!        │                    │                        ├─ as_catalog_member()
//!        │                    │ strata                 ├─ as_mappable()
//!        ▼                    ▼                        ├─ as_group()
//!   StratumOrder ◄──── sorts  { "user": {...},          └─ as_reference()
//!                              "definition": {...} }
//! ```

mod base;
mod capability;
mod factory;
mod registry;
mod upsert;

pub use base::{dereference, Model, ModelRef};
pub use capability::{
    CatalogMember, Chartable, Group, MapItem, Mappable, ModelBehavior, Reference, TimeVarying,
};
pub use factory::ModelFactory;
pub use registry::ModelRegistry;
pub use upsert::{update_model_from_json, upsert_model_from_json, UpsertOptions};
