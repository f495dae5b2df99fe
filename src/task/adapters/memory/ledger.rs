//! In-memory quota ledger.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{ChannelId, TokenId, UserId},
    ports::{ConsumeContext, ConsumeLogEntry, QuotaLedger, QuotaLedgerError, QuotaLedgerResult},
};

/// One call to [`QuotaLedger::post_consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedCharge {
    /// Routing facts of the charge.
    pub context: ConsumeContext,
    /// Amount debited; negative amounts are credits.
    pub amount: i64,
    /// Estimate the charge settles.
    pub pre_charged: i64,
}

/// Used-quota and request counters of one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounter {
    /// Total quota used.
    pub used_quota: i64,
    /// Number of billed requests.
    pub request_count: u64,
}

/// Thread-safe in-memory quota ledger.
///
/// Balances are created on first credit or debit; reading the balance of an
/// unknown user fails.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuotaLedger {
    state: Arc<RwLock<LedgerState>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<UserId, i64>,
    token_used: HashMap<TokenId, i64>,
    posted: Vec<PostedCharge>,
    consume_logs: Vec<ConsumeLogEntry>,
    system_logs: Vec<(UserId, String)>,
    user_usage: HashMap<UserId, UsageCounter>,
    channel_usage: HashMap<ChannelId, i64>,
}

fn poisoned(err: impl std::fmt::Display) -> QuotaLedgerError {
    QuotaLedgerError::persistence(std::io::Error::other(err.to_string()))
}

impl InMemoryQuotaLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a user's balance, creating the account if needed.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaLedgerError::Persistence`] when the lock is poisoned.
    pub fn set_balance(&self, user_id: UserId, balance: i64) -> QuotaLedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.balances.insert(user_id, balance);
        Ok(())
    }

    /// Returns a user's balance, or `None` for unknown users.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaLedgerError::Persistence`] when the lock is poisoned.
    pub fn balance_of(&self, user_id: UserId) -> QuotaLedgerResult<Option<i64>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.balances.get(&user_id).copied())
    }

    /// Returns every posted charge in order.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaLedgerError::Persistence`] when the lock is poisoned.
    pub fn posted_charges(&self) -> QuotaLedgerResult<Vec<PostedCharge>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.posted.clone())
    }

    /// Returns every consumption log entry in order.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaLedgerError::Persistence`] when the lock is poisoned.
    pub fn consume_logs(&self) -> QuotaLedgerResult<Vec<ConsumeLogEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.consume_logs.clone())
    }

    /// Returns every system log entry in order.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaLedgerError::Persistence`] when the lock is poisoned.
    pub fn system_logs(&self) -> QuotaLedgerResult<Vec<(UserId, String)>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.system_logs.clone())
    }

    /// Returns a user's usage counters.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaLedgerError::Persistence`] when the lock is poisoned.
    pub fn user_usage(&self, user_id: UserId) -> QuotaLedgerResult<UsageCounter> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.user_usage.get(&user_id).copied().unwrap_or_default())
    }

    /// Returns a channel's used quota.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaLedgerError::Persistence`] when the lock is poisoned.
    pub fn channel_usage(&self, channel_id: ChannelId) -> QuotaLedgerResult<i64> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.channel_usage.get(&channel_id).copied().unwrap_or_default())
    }

    /// Returns the quota consumed through a token.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaLedgerError::Persistence`] when the lock is poisoned.
    pub fn token_usage(&self, token_id: TokenId) -> QuotaLedgerResult<i64> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.token_used.get(&token_id).copied().unwrap_or_default())
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn get_balance(&self, user_id: UserId) -> QuotaLedgerResult<i64> {
        let state = self.state.read().map_err(poisoned)?;
        state
            .balances
            .get(&user_id)
            .copied()
            .ok_or(QuotaLedgerError::UnknownUser(user_id))
    }

    async fn increase_balance(&self, user_id: UserId, amount: i64) -> QuotaLedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let balance = state.balances.entry(user_id).or_default();
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    async fn post_consume(
        &self,
        context: &ConsumeContext,
        amount: i64,
        pre_charged: i64,
        _sync: bool,
    ) -> QuotaLedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let balance = state.balances.entry(context.user_id).or_default();
        *balance = balance.saturating_sub(amount);
        let used = state.token_used.entry(context.token_id).or_default();
        *used = used.saturating_add(amount);
        state.posted.push(PostedCharge {
            context: context.clone(),
            amount,
            pre_charged,
        });
        Ok(())
    }

    async fn record_consume_log(&self, entry: ConsumeLogEntry) -> QuotaLedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.consume_logs.push(entry);
        Ok(())
    }

    async fn record_system_log(&self, user_id: UserId, content: String) -> QuotaLedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.system_logs.push((user_id, content));
        Ok(())
    }

    async fn update_user_usage(&self, user_id: UserId, amount: i64) -> QuotaLedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let counter = state.user_usage.entry(user_id).or_default();
        counter.used_quota = counter.used_quota.saturating_add(amount);
        counter.request_count = counter.request_count.saturating_add(1);
        Ok(())
    }

    async fn update_channel_usage(
        &self,
        channel_id: ChannelId,
        amount: i64,
    ) -> QuotaLedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let used = state.channel_usage.entry(channel_id).or_default();
        *used = used.saturating_add(amount);
        Ok(())
    }
}
