//! Final charge posting after an upstream accepted a call.

use super::quota::QuotaBreakdown;
use crate::task::ports::{ConsumeContext, ConsumeLogEntry, QuotaLedger, QuotaLedgerResult};

/// Everything needed to post the final charge of one call.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementContext {
    /// Who pays.
    pub consume: ConsumeContext,
    /// Normalized action, recorded in fixed-price log lines.
    pub action: String,
    /// Estimate computed before the call.
    pub pre_charge: i64,
    /// Final quota and the figures it was derived from.
    pub breakdown: QuotaBreakdown,
    /// Balance observed before the call.
    pub balance_before: i64,
}

/// Outcome of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementResult {
    /// Quota charged.
    pub final_quota: i64,
    /// Difference between the final quota and the estimate.
    pub delta: i64,
    /// `true` when a consumption log entry and usage counters were written.
    pub logged: bool,
}

/// Posts the final charge.
///
/// The ledger is always asked to post the charge. Consumption logs and usage
/// counters are only written for non-zero charges.
///
/// # Errors
///
/// Returns the first ledger failure.
pub async fn settle(
    ledger: &dyn QuotaLedger,
    context: SettlementContext,
) -> QuotaLedgerResult<SettlementResult> {
    let SettlementContext {
        consume,
        action,
        pre_charge,
        breakdown,
        balance_before,
    } = context;
    let final_quota = breakdown.quota;
    let delta = final_quota.saturating_sub(pre_charge);
    ledger
        .post_consume(&consume, final_quota, pre_charge, true)
        .await?;
    tracing::debug!(
        target: "taskrelay::billing",
        user_id = %consume.user_id,
        model = %breakdown.model_name,
        billing_type = breakdown.billing_type.as_str(),
        pre_charge,
        final_quota,
        delta,
        "charge posted"
    );
    if final_quota == 0 {
        return Ok(SettlementResult {
            final_quota,
            delta,
            logged: false,
        });
    }
    let usage = breakdown.usage.unwrap_or_default();
    ledger
        .record_consume_log(ConsumeLogEntry {
            user_id: consume.user_id,
            channel_id: consume.channel_id,
            token_id: consume.token_id,
            token_name: consume.token_name.clone(),
            model_name: breakdown.model_name.clone(),
            group: consume.group.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            quota: final_quota,
            balance_before,
            content: breakdown.log_content(&action),
            other: breakdown.log_details(),
        })
        .await?;
    ledger
        .update_user_usage(consume.user_id, final_quota)
        .await?;
    ledger
        .update_channel_usage(consume.channel_id, final_quota)
        .await?;
    Ok(SettlementResult {
        final_quota,
        delta,
        logged: true,
    })
}
