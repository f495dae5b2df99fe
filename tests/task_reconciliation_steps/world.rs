//! Shared world state for task reconciliation BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use mockito::{Mock, Server, ServerGuard};
use rstest::fixture;
use taskrelay::billing::QuotaPolicy;
use taskrelay::relay::{AdaptorRegistry, RelayContext, UpstreamClient};
use taskrelay::task::{
    adapters::memory::{
        InMemoryChannelDirectory, InMemoryQuotaLedger, InMemoryTaskStore, PricingTable,
        StaticPricing,
    },
    domain::{ChannelId, ExternalTaskId, Platform, Task, TaskRecordId, TokenId, UserId},
    ports::{Channel, ChannelStatus, TaskStore},
    services::{ReconciliationService, RelayPorts, TaskSubmitService},
};

/// User every scenario acts as.
pub const USER: UserId = UserId::new(7);
/// Channel every scenario routes through.
pub const CHANNEL: ChannelId = ChannelId::new(3);

/// Ports type used by the BDD world.
pub type TestPorts = RelayPorts<InMemoryTaskStore, InMemoryQuotaLedger, DefaultClock>;

/// Scenario world for reconciliation behaviour tests.
pub struct ReconciliationWorld {
    pub server: ServerGuard,
    pub mocks: Vec<Mock>,
    pub store: Arc<InMemoryTaskStore>,
    pub ledger: Arc<InMemoryQuotaLedger>,
    pub ports: TestPorts,
    pub reconciler: ReconciliationService<InMemoryTaskStore, InMemoryQuotaLedger, DefaultClock>,
    pub orphan: Option<TaskRecordId>,
}

impl ReconciliationWorld {
    /// Creates a world wired to a fresh mock upstream.
    pub fn new() -> Self {
        let server = run_async(Server::new_async());
        let store = Arc::new(InMemoryTaskStore::new());
        let ledger = Arc::new(InMemoryQuotaLedger::new());
        let channels = Arc::new(InMemoryChannelDirectory::new());
        channels
            .upsert(Channel {
                id: CHANNEL,
                base_url: server.url(),
                key: "sk-upstream".to_owned(),
                status: ChannelStatus::Enabled,
            })
            .expect("channel registers");
        let mut table = PricingTable::default();
        table.model_prices.insert("suno_music".to_owned(), 0.2);
        let ports = RelayPorts {
            store: Arc::clone(&store),
            ledger: Arc::clone(&ledger),
            pricing: Arc::new(StaticPricing::new(table)),
            channels,
            registry: AdaptorRegistry::with_defaults(None),
            client: UpstreamClient::new(Duration::from_secs(5), Duration::from_secs(5))
                .expect("client builds"),
            clock: Arc::new(DefaultClock),
        };
        let reconciler = ReconciliationService::new(ports.clone(), 100);
        Self {
            server,
            mocks: Vec::new(),
            store,
            ledger,
            ports,
            reconciler,
            orphan: None,
        }
    }

    /// Builds a submission service over the world's ports.
    pub fn submitter(&self) -> TaskSubmitService<InMemoryTaskStore, InMemoryQuotaLedger, DefaultClock> {
        TaskSubmitService::new(self.ports.clone(), QuotaPolicy::default())
    }

    /// Routing context of the scenario user on the scenario channel.
    pub fn context(&self, platform: Platform, model: &str, action: &str) -> RelayContext {
        let mut context = RelayContext::new(platform);
        context.user_id = USER;
        context.group = "default".to_owned();
        context.user_group = "default".to_owned();
        context.channel_id = CHANNEL;
        context.token_id = TokenId::new(11);
        context.token_key = "tk-client".to_owned();
        context.token_name = "bdd".to_owned();
        context.base_url = self.server.url();
        context.api_key = "sk-upstream".to_owned();
        context.origin_model_name = model.to_owned();
        context.action = action.to_owned();
        context
    }

    /// Looks up a task of the scenario user by upstream identifier.
    pub fn task(&self, external_id: &str) -> Result<Task, eyre::Report> {
        run_async(
            self.store
                .get_by_task_id(USER, &ExternalTaskId::new(external_id)),
        )?
        .ok_or_else(|| eyre::eyre!("task {external_id} not stored"))
    }
}

impl Default for ReconciliationWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ReconciliationWorld {
    ReconciliationWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
