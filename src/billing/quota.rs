//! Quota arithmetic for pre-charges and final charges.

use serde_json::{Map, Value, json};

use crate::relay::Usage;
use crate::task::ports::PricingResolver;

/// Quota units per currency unit.
pub const DEFAULT_QUOTA_PER_UNIT: i64 = 500_000;

/// Price used when a model has neither a configured nor a default price.
pub const DEFAULT_FALLBACK_MODEL_PRICE: f64 = 0.1;

/// Deployment constants of the quota arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaPolicy {
    /// Quota units per currency unit.
    pub quota_per_unit: i64,
    /// Price used for unpriced models at pre-charge time.
    pub fallback_model_price: f64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            quota_per_unit: DEFAULT_QUOTA_PER_UNIT,
            fallback_model_price: DEFAULT_FALLBACK_MODEL_PRICE,
        }
    }
}

impl QuotaPolicy {
    /// Converts a price into quota units, truncating toward zero.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        reason = "prices are fractional currency amounts converted to whole quota units"
    )]
    pub fn price_to_quota(&self, price: f64, group_ratio: f64) -> i64 {
        (price * group_ratio * self.quota_per_unit as f64).trunc() as i64
    }
}

/// Estimate reserved before a submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreCharge {
    /// Price the estimate used.
    pub model_price: f64,
    /// Group ratio the estimate used.
    pub group_ratio: f64,
    /// Estimated quota.
    pub quota: i64,
}

/// Computes the pre-charge for `model`.
///
/// The configured per-call price wins, then the built-in default price, then
/// the policy's fallback price.
#[must_use]
pub fn precharge_quota(
    pricing: &dyn PricingResolver,
    policy: &QuotaPolicy,
    model: &str,
    group_ratio: f64,
) -> PreCharge {
    let model_price = pricing
        .get_model_price(model, true)
        .or_else(|| pricing.default_model_ratio(model))
        .unwrap_or(policy.fallback_model_price);
    PreCharge {
        model_price,
        group_ratio,
        quota: policy.price_to_quota(model_price, group_ratio),
    }
}

/// How a final charge was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillingType {
    /// Token usage times ratios.
    Usage,
    /// Flat per-call price of a pass-through model.
    PerRequest,
    /// Fixed platform price, equal to the pre-charge.
    FixedPrice,
    /// Nothing to charge.
    Free,
}

impl BillingType {
    /// Returns the label recorded in consumption logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::PerRequest => "per_request",
            Self::FixedPrice => "fixed_price",
            Self::Free => "free",
        }
    }
}

/// A final quota together with the figures it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaBreakdown {
    /// Final quota.
    pub quota: i64,
    /// Billing mode.
    pub billing_type: BillingType,
    /// Model the charge was priced under.
    pub model_name: String,
    /// Flat price, when one applied.
    pub model_price: Option<f64>,
    /// Model ratio at the time of the charge.
    pub model_ratio: f64,
    /// Completion ratio at the time of the charge.
    pub completion_ratio: f64,
    /// Group ratio at the time of the charge.
    pub group_ratio: f64,
    /// Usage the charge was derived from, if any.
    pub usage: Option<Usage>,
}

impl QuotaBreakdown {
    /// Builds the breakdown of a fixed platform price.
    #[must_use]
    pub fn fixed(model_name: impl Into<String>, pre_charge: &PreCharge) -> Self {
        Self {
            quota: pre_charge.quota,
            billing_type: BillingType::FixedPrice,
            model_name: model_name.into(),
            model_price: Some(pre_charge.model_price),
            model_ratio: 0.0,
            completion_ratio: 0.0,
            group_ratio: pre_charge.group_ratio,
            usage: None,
        }
    }

    /// Returns the structured details recorded with the consumption log.
    ///
    /// `model_price` is `-1` when the charge was ratio-based.
    #[must_use]
    pub fn log_details(&self) -> Map<String, Value> {
        let mut other = Map::new();
        other.insert("billing_type".to_owned(), json!(self.billing_type.as_str()));
        other.insert("model_name".to_owned(), json!(self.model_name));
        other.insert("group_ratio".to_owned(), json!(self.group_ratio));
        other.insert("model_price".to_owned(), json!(self.model_price.unwrap_or(-1.0)));
        if self.billing_type != BillingType::FixedPrice {
            other.insert("model_ratio".to_owned(), json!(self.model_ratio));
            other.insert("completion_ratio".to_owned(), json!(self.completion_ratio));
        }
        if let Some(usage) = &self.usage {
            other.insert("usage".to_owned(), json!(usage));
        }
        other
    }

    /// Returns the human-readable summary recorded with the consumption log.
    #[must_use]
    pub fn log_content(&self, action: &str) -> String {
        match self.billing_type {
            BillingType::Usage => {
                let usage = self.usage.unwrap_or_default();
                format!(
                    "usage billing: prompt_tokens={}, completion_tokens={}, model_ratio={:.2}, completion_ratio={:.2}, group_ratio={:.2}",
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    self.model_ratio,
                    self.completion_ratio,
                    self.group_ratio
                )
            }
            BillingType::PerRequest => format!(
                "per-call billing: model_price={:.4}, group_ratio={:.2}",
                self.model_price.unwrap_or_default(),
                self.group_ratio
            ),
            BillingType::FixedPrice => format!(
                "fixed model price {:.2}, group ratio {:.2}, action {action}",
                self.model_price.unwrap_or_default(),
                self.group_ratio
            ),
            BillingType::Free => format!(
                "free: model {} reported no usage and has no per-call price",
                self.model_name
            ),
        }
    }
}

/// Computes the final quota of a pass-through call.
///
/// Reported usage with positive `total_tokens` is billed by ratio, rounded,
/// and never below one unit while the ratios are positive. Without usage a
/// positive flat price is billed per call. Anything else is free.
#[must_use]
pub fn custom_pass_quota(
    pricing: &dyn PricingResolver,
    policy: &QuotaPolicy,
    model: &str,
    group_ratio: f64,
    usage: Option<&Usage>,
) -> QuotaBreakdown {
    let model_price = pricing.get_model_price(model, false);
    let model_ratio = pricing.get_model_ratio(model);
    let completion_ratio = pricing.get_completion_ratio(model);
    let mut breakdown = QuotaBreakdown {
        quota: 0,
        billing_type: BillingType::Free,
        model_name: model.to_owned(),
        model_price: None,
        model_ratio,
        completion_ratio,
        group_ratio,
        usage: None,
    };
    if let Some(reported) = usage.filter(|reported| reported.total_tokens > 0) {
        breakdown.billing_type = BillingType::Usage;
        breakdown.quota = usage_quota(reported, model_ratio, completion_ratio, group_ratio);
        breakdown.usage = Some(*reported);
        breakdown.model_price = model_price.filter(|price| *price > 0.0);
        return breakdown;
    }
    if let Some(price) = model_price.filter(|price| *price > 0.0) {
        breakdown.billing_type = BillingType::PerRequest;
        breakdown.quota = policy.price_to_quota(price, group_ratio);
        breakdown.model_price = Some(price);
    }
    breakdown
}

#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    reason = "token counts are scaled by fractional ratios and rounded to whole quota units"
)]
fn usage_quota(usage: &Usage, model_ratio: f64, completion_ratio: f64, group_ratio: f64) -> i64 {
    let weighted =
        usage.prompt_tokens as f64 + usage.completion_tokens as f64 * completion_ratio;
    let quota = (weighted * model_ratio * group_ratio).round() as i64;
    if quota < 1 && model_ratio > 0.0 && group_ratio > 0.0 {
        return 1;
    }
    quota
}
