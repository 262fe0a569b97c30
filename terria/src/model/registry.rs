//! The model registry: every live model of one session, by id.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::DeveloperError;
use crate::strata::StratumOrder;

use super::base::{Model, ModelRef};
use super::capability::ModelBehavior;
use super::factory::ModelFactory;

#[derive(Default)]
struct RegistryState {
    models: HashMap<String, ModelRef>,
    insertion_order: Vec<String>,
    share_keys: HashMap<String, String>,
    model_id_share_keys: HashMap<String, Vec<String>>,
}

/// Owns the models of one session and resolves ids and share keys.
///
/// No two models share a `unique_id`. Share keys are historical aliases:
/// many may map onto one id, none equals the id it maps to, and the first
/// registration of a share key wins.
pub struct ModelRegistry {
    state: RwLock<RegistryState>,
    factory: RwLock<ModelFactory>,
    order: Arc<StratumOrder>,
    self_ref: Weak<ModelRegistry>,
}

impl ModelRegistry {
    /// Creates a registry with its own stratum order.
    pub fn new(factory: ModelFactory) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            state: RwLock::new(RegistryState::default()),
            factory: RwLock::new(factory),
            order: Arc::new(StratumOrder::new()),
            self_ref: self_ref.clone(),
        })
    }

    /// The stratum order shared by every model of this registry.
    pub fn order(&self) -> &Arc<StratumOrder> {
        &self.order
    }

    /// Registers an additional model type.
    pub fn register_type(&self, behavior: Arc<dyn ModelBehavior>) {
        self.factory.write().register(behavior);
    }

    /// Creates an unregistered model of a known type.
    ///
    /// Returns `None` when the type is unknown.
    pub fn create_model(&self, type_name: &str, unique_id: Option<String>) -> Option<ModelRef> {
        let behavior = self.factory.read().find(type_name)?;
        Some(self.create_with_behavior(behavior, unique_id))
    }

    /// Creates an unregistered model with an explicit behaviour.
    pub fn create_with_behavior(
        &self,
        behavior: Arc<dyn ModelBehavior>,
        unique_id: Option<String>,
    ) -> ModelRef {
        Model::new(
            unique_id,
            behavior,
            Arc::clone(&self.order),
            self.self_ref.clone(),
        )
    }

    /// Adds a model and registers its share keys.
    pub fn add_model(&self, model: ModelRef, share_keys: &[String]) -> Result<(), DeveloperError> {
        let id = model
            .unique_id()
            .ok_or(DeveloperError::MissingUniqueId { operation: "added" })?
            .to_string();
        {
            let mut state = self.state.write();
            if state.models.contains_key(&id) {
                return Err(DeveloperError::DuplicateModel(id));
            }
            state.models.insert(id.clone(), model);
            state.insertion_order.push(id.clone());
        }
        debug!(model = %id, "Added model");
        for key in share_keys {
            self.add_share_key(&id, key);
        }
        Ok(())
    }

    /// Removes a model by id, dropping its share keys, and disposes it.
    pub fn remove_model(&self, id: &str) -> Option<ModelRef> {
        let model = {
            let mut state = self.state.write();
            let model = state.models.remove(id)?;
            state.insertion_order.retain(|known| known != id);
            if let Some(keys) = state.model_id_share_keys.remove(id) {
                for key in keys {
                    state.share_keys.remove(&key);
                }
            }
            model
        };
        model.dispose();
        debug!(model = %id, "Removed model");
        Some(model)
    }

    /// Records `share_key` as an alias of `id`.
    ///
    /// Ignored when the key equals the id or is already registered.
    pub fn add_share_key(&self, id: &str, share_key: &str) {
        if id == share_key {
            return;
        }
        let mut state = self.state.write();
        if state.share_keys.contains_key(share_key) {
            return;
        }
        state
            .share_keys
            .insert(share_key.to_string(), id.to_string());
        state
            .model_id_share_keys
            .entry(id.to_string())
            .or_default()
            .push(share_key.to_string());
    }

    /// Share keys registered for `id`.
    pub fn share_keys_of(&self, id: &str) -> Vec<String> {
        self.state
            .read()
            .model_id_share_keys
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_model_by_id(&self, id: &str) -> Option<ModelRef> {
        self.state.read().models.get(id).cloned()
    }

    pub fn get_model_id_by_share_key(&self, share_key: &str) -> Option<String> {
        self.state.read().share_keys.get(share_key).cloned()
    }

    /// Resolves a live id, falling back to share keys.
    pub fn get_model_by_id_or_share_key(&self, id: &str) -> Option<ModelRef> {
        if let Some(model) = self.get_model_by_id(id) {
            return Some(model);
        }
        let resolved = self.get_model_id_by_share_key(id)?;
        self.get_model_by_id(&resolved)
    }

    /// Ids of all registered models in insertion order.
    pub fn model_ids(&self) -> Vec<String> {
        self.state.read().insertion_order.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.len())
            .field("factory", &*self.factory.read())
            .finish()
    }
}
