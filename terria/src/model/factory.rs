//! Type name → model behaviour lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::capability::ModelBehavior;

/// Creates models of registered types by name.
#[derive(Default, Clone)]
pub struct ModelFactory {
    types: HashMap<&'static str, Arc<dyn ModelBehavior>>,
}

impl ModelFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type under its own type name, replacing any previous one.
    pub fn register(&mut self, behavior: Arc<dyn ModelBehavior>) {
        self.types.insert(behavior.type_name(), behavior);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, behavior: Arc<dyn ModelBehavior>) -> Self {
        self.register(behavior);
        self
    }

    /// The behaviour registered for `type_name`.
    pub fn find(&self, type_name: &str) -> Option<Arc<dyn ModelBehavior>> {
        self.types.get(type_name).cloned()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.types.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ModelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFactory")
            .field("types", &self.type_names())
            .finish()
    }
}
