//! Shared test helpers for in-memory integration tests.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use mockito::{Server, ServerGuard};
use taskrelay::billing::QuotaPolicy;
use taskrelay::relay::{AdaptorRegistry, RelayContext, UpstreamClient};
use taskrelay::task::{
    adapters::memory::{
        InMemoryChannelDirectory, InMemoryQuotaLedger, InMemoryTaskStore, PricingTable,
        StaticPricing,
    },
    domain::{ChannelId, Platform, TokenId, UserId},
    ports::{Channel, ChannelStatus},
    services::{ReconciliationService, RelayPorts, TaskQueryService, TaskSubmitService},
};

/// Calling user.
pub const USER: UserId = UserId::new(21);
/// Serving channel.
pub const CHANNEL: ChannelId = ChannelId::new(5);
/// Calling token.
pub const TOKEN: TokenId = TokenId::new(8);
/// Starting balance of [`USER`].
pub const STARTING_BALANCE: i64 = 2_000_000;

/// Ports backed by in-memory adapters.
pub type MemoryPorts = RelayPorts<InMemoryTaskStore, InMemoryQuotaLedger, DefaultClock>;

/// Submission, reconciliation and query services over one set of ports.
pub struct Gateway {
    pub server: ServerGuard,
    pub store: Arc<InMemoryTaskStore>,
    pub ledger: Arc<InMemoryQuotaLedger>,
    pub submitter: TaskSubmitService<InMemoryTaskStore, InMemoryQuotaLedger, DefaultClock>,
    pub reconciler: ReconciliationService<InMemoryTaskStore, InMemoryQuotaLedger, DefaultClock>,
    pub queries: TaskQueryService<InMemoryTaskStore>,
}

impl Gateway {
    /// Builds a gateway whose only channel points at a fresh mock upstream.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel, balance or client cannot be set up.
    pub async fn start(table: PricingTable) -> Result<Self, eyre::Report> {
        let server = Server::new_async().await;
        let store = Arc::new(InMemoryTaskStore::new());
        let ledger = Arc::new(InMemoryQuotaLedger::new());
        let channels = Arc::new(InMemoryChannelDirectory::new());
        channels.upsert(Channel {
            id: CHANNEL,
            base_url: server.url(),
            key: "sk-integration".to_owned(),
            status: ChannelStatus::Enabled,
        })?;
        ledger.set_balance(USER, STARTING_BALANCE)?;
        let ports: MemoryPorts = RelayPorts {
            store: Arc::clone(&store),
            ledger: Arc::clone(&ledger),
            pricing: Arc::new(StaticPricing::new(table)),
            channels,
            registry: AdaptorRegistry::with_defaults(Some("X-Client-Token".to_owned())),
            client: UpstreamClient::new(Duration::from_secs(5), Duration::from_secs(5))?,
            clock: Arc::new(DefaultClock),
        };
        Ok(Self {
            server,
            store: Arc::clone(&store),
            ledger,
            submitter: TaskSubmitService::new(ports.clone(), QuotaPolicy::default()),
            reconciler: ReconciliationService::new(ports, 50),
            queries: TaskQueryService::new(store),
        })
    }

    /// Routing context of [`USER`] on [`CHANNEL`].
    #[must_use]
    pub fn context(&self, platform: Platform, model: &str, action: &str) -> RelayContext {
        let mut context = RelayContext::new(platform);
        context.user_id = USER;
        context.group = "default".to_owned();
        context.user_group = "default".to_owned();
        context.channel_id = CHANNEL;
        context.token_id = TOKEN;
        context.token_key = "tk-integration".to_owned();
        context.token_name = "integration".to_owned();
        context.base_url = self.server.url();
        context.api_key = "sk-integration".to_owned();
        context.origin_model_name = model.to_owned();
        context.action = action.to_owned();
        context
    }

    /// Returns the current balance of [`USER`].
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn balance(&self) -> Result<i64, eyre::Report> {
        Ok(self.ledger.balance_of(USER)?.unwrap_or_default())
    }
}

/// Pricing with flat prices for the given models.
#[must_use]
pub fn prices(entries: &[(&str, f64)]) -> PricingTable {
    let mut table = PricingTable::default();
    for (model, price) in entries {
        table.model_prices.insert((*model).to_owned(), *price);
    }
    table
}
