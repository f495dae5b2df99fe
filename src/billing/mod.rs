//! Quota pre-charge, final charge and settlement.
//!
//! Submissions are estimated with [`precharge_quota`] before the upstream is
//! called. Once the upstream accepts, the final quota is either the estimate
//! (fixed platform prices) or the pass-through duality computed by
//! [`custom_pass_quota`], and [`settle`] posts it to the ledger.

mod quota;
mod settlement;

pub use quota::{
    BillingType, DEFAULT_FALLBACK_MODEL_PRICE, DEFAULT_QUOTA_PER_UNIT, PreCharge, QuotaBreakdown,
    QuotaPolicy, custom_pass_quota, precharge_quota,
};
pub use settlement::{SettlementContext, SettlementResult, settle};
