//! Pricing port resolving per-model prices and ratios.

/// Read-only view of the ratio and price configuration.
#[cfg_attr(test, mockall::automock)]
pub trait PricingResolver: Send + Sync {
    /// Returns the flat per-call price when the model is priced per call.
    ///
    /// `for_precharge` marks lookups made while estimating a pre-charge.
    fn get_model_price(&self, model: &str, for_precharge: bool) -> Option<f64>;

    /// Returns the usage ratio applied to prompt tokens.
    fn get_model_ratio(&self, model: &str) -> f64;

    /// Returns the multiplier applied to completion tokens.
    fn get_completion_ratio(&self, model: &str) -> f64;

    /// Returns the built-in default price for a model, if any.
    fn default_model_ratio(&self, model: &str) -> Option<f64>;

    /// Returns the discount or markup of a pricing group.
    fn get_group_ratio(&self, group: &str) -> f64;

    /// Returns a user-group specific override of `group`'s ratio.
    fn get_group_group_ratio(&self, user_group: &str, group: &str) -> Option<f64>;

    /// Returns the ratio that applies to a caller: the user-group override
    /// when one exists, otherwise the plain group ratio.
    fn effective_group_ratio(&self, user_group: &str, group: &str) -> f64 {
        self.get_group_group_ratio(user_group, group)
            .unwrap_or_else(|| self.get_group_ratio(group))
    }
}
