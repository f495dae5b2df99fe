//! Ledger port for user balances, consumption logs, and usage counters.

use crate::task::domain::{ChannelId, TokenId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Result type for quota ledger operations.
pub type QuotaLedgerResult<T> = Result<T, QuotaLedgerError>;

/// Quota ledger contract.
///
/// Every balance mutation is an additive delta so concurrent settlements and
/// refunds never lose updates.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Returns the user's current balance.
    async fn get_balance(&self, user_id: UserId) -> QuotaLedgerResult<i64>;

    /// Credits `amount` to the user's balance.
    async fn increase_balance(&self, user_id: UserId, amount: i64) -> QuotaLedgerResult<()>;

    /// Posts a charge for a relayed call.
    ///
    /// A positive `amount` debits the user and token; a negative one credits
    /// them. `pre_charged` is the estimate the charge settles.
    async fn post_consume(
        &self,
        context: &ConsumeContext,
        amount: i64,
        pre_charged: i64,
        sync: bool,
    ) -> QuotaLedgerResult<()>;

    /// Appends a consumption log entry.
    async fn record_consume_log(&self, entry: ConsumeLogEntry) -> QuotaLedgerResult<()>;

    /// Appends a system log entry for the user, such as a refund notice.
    async fn record_system_log(&self, user_id: UserId, content: String) -> QuotaLedgerResult<()>;

    /// Adds `amount` to the user's used quota and request counters.
    async fn update_user_usage(&self, user_id: UserId, amount: i64) -> QuotaLedgerResult<()>;

    /// Adds `amount` to the channel's used quota counter.
    async fn update_channel_usage(&self, channel_id: ChannelId, amount: i64)
    -> QuotaLedgerResult<()>;
}

/// Routing facts identifying who pays for a relayed call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeContext {
    /// Paying user.
    pub user_id: UserId,
    /// Channel that served the call.
    pub channel_id: ChannelId,
    /// Calling token.
    pub token_id: TokenId,
    /// Calling token display name.
    pub token_name: String,
    /// Pricing group.
    pub group: String,
}

/// One consumption log entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumeLogEntry {
    /// Paying user.
    pub user_id: UserId,
    /// Serving channel.
    pub channel_id: ChannelId,
    /// Calling token.
    pub token_id: TokenId,
    /// Calling token display name.
    pub token_name: String,
    /// Billed model.
    pub model_name: String,
    /// Pricing group.
    pub group: String,
    /// Prompt tokens, zero for per-call billing.
    pub prompt_tokens: i64,
    /// Completion tokens, zero for per-call billing.
    pub completion_tokens: i64,
    /// Charged quota.
    pub quota: i64,
    /// User balance observed before the charge.
    pub balance_before: i64,
    /// Human-readable summary.
    pub content: String,
    /// Structured pricing details for audit.
    pub other: Map<String, Value>,
}

/// Errors returned by quota ledger implementations.
#[derive(Debug, Clone, Error)]
pub enum QuotaLedgerError {
    /// The user is unknown to the ledger.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// Persistence-layer failure.
    #[error("ledger error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl QuotaLedgerError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
