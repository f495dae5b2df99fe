//! Collaborators shared by the relay services.

use std::sync::Arc;

use mockable::Clock;

use crate::relay::{AdaptorRegistry, UpstreamClient};
use crate::task::ports::{ChannelDirectory, PricingResolver, QuotaLedger, TaskStore};

/// Ports and infrastructure the submission and reconciliation services use.
pub struct RelayPorts<S, L, C>
where
    S: TaskStore,
    L: QuotaLedger,
    C: Clock + Send + Sync,
{
    /// Task persistence.
    pub store: Arc<S>,
    /// Balances and logs.
    pub ledger: Arc<L>,
    /// Prices and ratios.
    pub pricing: Arc<dyn PricingResolver>,
    /// Channel credentials.
    pub channels: Arc<dyn ChannelDirectory>,
    /// Adaptors by platform.
    pub registry: AdaptorRegistry,
    /// Shared upstream HTTP client.
    pub client: UpstreamClient,
    /// Time source.
    pub clock: Arc<C>,
}

impl<S, L, C> Clone for RelayPorts<S, L, C>
where
    S: TaskStore,
    L: QuotaLedger,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: Arc::clone(&self.ledger),
            pricing: Arc::clone(&self.pricing),
            channels: Arc::clone(&self.channels),
            registry: self.registry.clone(),
            client: self.client.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}
