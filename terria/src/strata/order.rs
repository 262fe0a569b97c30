//! Stratum priority registry.
//!
//! Strata are ordered by a registered priority, never by insertion order.
//! Each kind of stratum occupies its own band so that, for example, every
//! load stratum sits below every definition stratum regardless of when
//! either was registered.
//!
//! ```text
//!   priority   band          strata
//!   ────────   ──────────    ─────────────────────────────
//!   3000+      user          user
//!   2000+      definition    underride, definition, override
//!   1000+      load          anything produced by a loader
//!   0+         defaults      defaults
//! ```

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Names of the strata every model understands.
pub struct CommonStrata;

impl CommonStrata {
    /// Values supplied by the model type itself.
    pub const DEFAULTS: &'static str = "defaults";
    /// Definition-band stratum below `definition`.
    pub const UNDERRIDE: &'static str = "underride";
    /// Values from catalog JSON.
    pub const DEFINITION: &'static str = "definition";
    /// Definition-band stratum above `definition`.
    pub const OVERRIDE: &'static str = "override";
    /// Interactive edits.
    pub const USER: &'static str = "user";
}

const DEFAULTS_BASE: i32 = 0;
const LOAD_BASE: i32 = 1000;
const DEFINITION_BASE: i32 = 2000;
const USER_BASE: i32 = 3000;

/// The band a stratum was registered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StratumBand {
    Defaults,
    Load,
    Definition,
    User,
}

impl StratumBand {
    fn base(self) -> i32 {
        match self {
            StratumBand::Defaults => DEFAULTS_BASE,
            StratumBand::Load => LOAD_BASE,
            StratumBand::Definition => DEFINITION_BASE,
            StratumBand::User => USER_BASE,
        }
    }
}

#[derive(Debug, Default)]
struct OrderState {
    priorities: HashMap<String, i32>,
    next: HashMap<i32, i32>,
}

/// Maps stratum ids to priorities.
#[derive(Debug)]
pub struct StratumOrder {
    state: RwLock<OrderState>,
}

impl StratumOrder {
    /// Creates an order with the common strata registered.
    pub fn new() -> Self {
        let order = Self {
            state: RwLock::new(OrderState::default()),
        };
        order.add(CommonStrata::DEFAULTS, StratumBand::Defaults);
        order.add(CommonStrata::UNDERRIDE, StratumBand::Definition);
        order.add(CommonStrata::DEFINITION, StratumBand::Definition);
        order.add(CommonStrata::OVERRIDE, StratumBand::Definition);
        order.add(CommonStrata::USER, StratumBand::User);
        order
    }

    /// Registers `id` at the next free priority of `band`.
    ///
    /// Registering an id twice keeps the original priority.
    pub fn add(&self, id: &str, band: StratumBand) -> i32 {
        let mut state = self.state.write();
        if let Some(priority) = state.priorities.get(id) {
            return *priority;
        }
        let base = band.base();
        let offset = state.next.entry(base).or_insert(0);
        let priority = base + *offset;
        *offset += 1;
        state.priorities.insert(id.to_string(), priority);
        debug!(stratum = id, priority, "Registered stratum");
        priority
    }

    /// Registers a load stratum.
    pub fn add_load_stratum(&self, id: &str) -> i32 {
        self.add(id, StratumBand::Load)
    }

    /// Priority of `id`, if registered.
    pub fn priority(&self, id: &str) -> Option<i32> {
        self.state.read().priorities.get(id).copied()
    }

    /// Priority of `id`, registering it as a load stratum when unknown.
    pub fn ensure(&self, id: &str) -> i32 {
        if let Some(priority) = self.priority(id) {
            return priority;
        }
        warn!(stratum = id, "Unregistered stratum, treating it as a load stratum");
        self.add_load_stratum(id)
    }

    /// Sorts stratum ids from highest to lowest priority.
    pub fn sort_top_to_bottom<'a, I>(&self, ids: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let state = self.state.read();
        let mut ids: Vec<(i32, &'a str)> = ids
            .into_iter()
            .map(|id| (state.priorities.get(id).copied().unwrap_or(LOAD_BASE), id))
            .collect();
        ids.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

impl Default for StratumOrder {
    fn default() -> Self {
        Self::new()
    }
}
