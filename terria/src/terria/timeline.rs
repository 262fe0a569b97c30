//! Items shown on the timeline.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::ModelRef;

/// Time-varying items driving the timeline, top of the stack first.
#[derive(Debug, Default)]
pub struct TimelineStack {
    items: RwLock<Vec<ModelRef>>,
}

impl TimelineStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<ModelRef> {
        self.items.read().clone()
    }

    pub fn set_items(&self, items: Vec<ModelRef>) {
        *self.items.write() = items;
    }

    /// The item whose clock drives the timeline.
    pub fn top(&self) -> Option<ModelRef> {
        self.items.read().first().cloned()
    }

    pub fn contains(&self, item: &ModelRef) -> bool {
        self.items.read().iter().any(|m| Arc::ptr_eq(m, item))
    }

    pub fn remove(&self, item: &ModelRef) {
        self.items.write().retain(|m| !Arc::ptr_eq(m, item));
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Current time of the top item, if it has one.
    pub fn current_time(&self) -> Option<String> {
        let top = self.top()?;
        let time_varying = top.behavior().as_time_varying()?;
        time_varying.current_time(&top)
    }
}
