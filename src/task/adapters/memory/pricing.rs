//! Static pricing resolver backed by a serde table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::task::ports::PricingResolver;

/// Ratio and price configuration, typically loaded from TOML.
///
/// Missing ratios resolve to `1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingTable {
    /// Flat per-call prices by model.
    pub model_prices: HashMap<String, f64>,
    /// Prompt-token ratios by model.
    pub model_ratios: HashMap<String, f64>,
    /// Completion-token multipliers by model.
    pub completion_ratios: HashMap<String, f64>,
    /// Built-in default prices by model, used when no price is configured.
    pub default_model_prices: HashMap<String, f64>,
    /// Pricing group ratios.
    pub group_ratios: HashMap<String, f64>,
    /// Per user-group overrides, keyed by user group then group.
    pub group_group_ratios: HashMap<String, HashMap<String, f64>>,
}

/// [`PricingResolver`] over an immutable [`PricingTable`].
#[derive(Debug, Clone, Default)]
pub struct StaticPricing {
    table: PricingTable,
}

const NEUTRAL_RATIO: f64 = 1.0;

impl StaticPricing {
    /// Creates a resolver over `table`.
    #[must_use]
    pub const fn new(table: PricingTable) -> Self {
        Self { table }
    }

    /// Returns the underlying table.
    #[must_use]
    pub const fn table(&self) -> &PricingTable {
        &self.table
    }
}

impl PricingResolver for StaticPricing {
    fn get_model_price(&self, model: &str, _for_precharge: bool) -> Option<f64> {
        self.table.model_prices.get(model).copied()
    }

    fn get_model_ratio(&self, model: &str) -> f64 {
        self.table
            .model_ratios
            .get(model)
            .copied()
            .unwrap_or(NEUTRAL_RATIO)
    }

    fn get_completion_ratio(&self, model: &str) -> f64 {
        self.table
            .completion_ratios
            .get(model)
            .copied()
            .unwrap_or(NEUTRAL_RATIO)
    }

    fn default_model_ratio(&self, model: &str) -> Option<f64> {
        self.table.default_model_prices.get(model).copied()
    }

    fn get_group_ratio(&self, group: &str) -> f64 {
        self.table
            .group_ratios
            .get(group)
            .copied()
            .unwrap_or(NEUTRAL_RATIO)
    }

    fn get_group_group_ratio(&self, user_group: &str, group: &str) -> Option<f64> {
        self.table
            .group_group_ratios
            .get(user_group)
            .and_then(|overrides| overrides.get(group))
            .copied()
    }
}
