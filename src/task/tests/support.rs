//! Shared fixtures for task service tests.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use mockito::{Server, ServerGuard};
use serde_json::Value;

use crate::relay::{AdaptorRegistry, RelayContext, UpstreamClient};
use crate::task::adapters::memory::{
    InMemoryChannelDirectory, InMemoryQuotaLedger, InMemoryTaskStore, PricingTable, StaticPricing,
};
use crate::task::domain::{
    ChannelId, ExternalTaskId, NewTask, PROGRESS_COMPLETE, PROGRESS_INITIAL, Platform, Task,
    TaskPayload, TaskProperties, TaskStatus, TokenId, UserId,
};
use crate::task::ports::{Channel, ChannelDirectory, ChannelStatus, TaskStore};
use crate::task::services::RelayPorts;

pub const USER: UserId = UserId::new(7);
pub const CHANNEL: ChannelId = ChannelId::new(3);
pub const TOKEN: TokenId = TokenId::new(11);
pub const API_KEY: &str = "sk-upstream";
pub const TOKEN_KEY: &str = "tk-client";

pub type TestPorts = RelayPorts<InMemoryTaskStore, InMemoryQuotaLedger, DefaultClock>;

/// In-memory ports wired to a local mock upstream.
pub struct Harness {
    pub server: ServerGuard,
    pub store: Arc<InMemoryTaskStore>,
    pub ledger: Arc<InMemoryQuotaLedger>,
    pub channels: Arc<InMemoryChannelDirectory>,
    pub ports: TestPorts,
}

impl Harness {
    pub async fn new(table: PricingTable) -> Self {
        Self::with_header_key(table, None).await
    }

    pub async fn with_header_key(table: PricingTable, header_key: Option<&str>) -> Self {
        let server = Server::new_async().await;
        let store = Arc::new(InMemoryTaskStore::new());
        let ledger = Arc::new(InMemoryQuotaLedger::new());
        let channels = Arc::new(InMemoryChannelDirectory::new());
        channels
            .upsert(channel(CHANNEL, &server.url(), ChannelStatus::Enabled))
            .expect("channel registers");
        ledger.set_balance(USER, 1_000_000).expect("balance set");
        let client = UpstreamClient::new(Duration::from_secs(5), Duration::from_secs(5))
            .expect("client builds");
        let directory: Arc<dyn ChannelDirectory> =
            Arc::<InMemoryChannelDirectory>::clone(&channels);
        let ports = RelayPorts {
            store: Arc::clone(&store),
            ledger: Arc::clone(&ledger),
            pricing: Arc::new(StaticPricing::new(table)),
            channels: directory,
            registry: AdaptorRegistry::with_defaults(header_key.map(str::to_owned)),
            client,
            clock: Arc::new(DefaultClock),
        };
        Self {
            server,
            store,
            ledger,
            channels,
            ports,
        }
    }

    /// Routing context of the default user, token and channel.
    pub fn context(&self, platform: Platform, model: &str, action: &str) -> RelayContext {
        let mut context = RelayContext::new(platform);
        context.user_id = USER;
        context.group = "default".to_owned();
        context.user_group = "default".to_owned();
        context.channel_id = CHANNEL;
        context.token_id = TOKEN;
        context.token_key = TOKEN_KEY.to_owned();
        context.token_name = "ci".to_owned();
        context.base_url = self.server.url();
        context.api_key = API_KEY.to_owned();
        context.origin_model_name = model.to_owned();
        context.action = action.to_owned();
        context
    }

    pub fn balance(&self) -> i64 {
        self.ledger
            .balance_of(USER)
            .expect("ledger readable")
            .unwrap_or_default()
    }

    pub fn stored(&self, task: &Task) -> Task {
        self.store
            .snapshot(task.id())
            .expect("store readable")
            .expect("task stored")
    }

    pub async fn stored_by_external(&self, external_id: &str) -> Task {
        self.store
            .get_by_task_id(USER, &ExternalTaskId::new(external_id))
            .await
            .expect("lookup succeeds")
            .expect("task persisted")
    }

    pub async fn seed(&self, seed: SeedTask) -> Task {
        seed_task(self.store.as_ref(), seed).await
    }
}

pub fn channel(id: ChannelId, base_url: &str, status: ChannelStatus) -> Channel {
    Channel {
        id,
        base_url: base_url.to_owned(),
        key: API_KEY.to_owned(),
        status,
    }
}

/// Pricing with a flat price for one model.
pub fn priced(model: &str, price: f64) -> PricingTable {
    let mut table = PricingTable::default();
    table.model_prices.insert(model.to_owned(), price);
    table
}

/// Parameters of a task inserted directly into a store.
#[derive(Debug, Clone)]
pub struct SeedTask {
    pub platform: Platform,
    pub external_id: &'static str,
    pub action: &'static str,
    pub status: TaskStatus,
    pub progress: &'static str,
    pub quota: i64,
    pub model: &'static str,
    pub channel_id: ChannelId,
    pub token_key: &'static str,
    pub data: Value,
}

impl SeedTask {
    pub fn new(platform: Platform, external_id: &'static str) -> Self {
        Self {
            platform,
            external_id,
            action: "MUSIC",
            status: TaskStatus::Submitted,
            progress: PROGRESS_INITIAL,
            quota: 0,
            model: "",
            channel_id: CHANNEL,
            token_key: TOKEN_KEY,
            data: Value::Null,
        }
    }

    pub const fn quota(mut self, quota: i64) -> Self {
        self.quota = quota;
        self
    }

    pub const fn status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub const fn progress(mut self, progress: &'static str) -> Self {
        self.progress = progress;
        self
    }

    /// Marks the task terminal with complete progress.
    pub const fn finished(self, status: TaskStatus) -> Self {
        self.status(status).progress(PROGRESS_COMPLETE)
    }

    pub const fn action(mut self, action: &'static str) -> Self {
        self.action = action;
        self
    }

    pub const fn model(mut self, model: &'static str) -> Self {
        self.model = model;
        self
    }

    pub const fn channel(mut self, channel_id: ChannelId) -> Self {
        self.channel_id = channel_id;
        self
    }

    pub const fn token_key(mut self, token_key: &'static str) -> Self {
        self.token_key = token_key;
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Builds the task without storing it.
    pub fn build(&self) -> Task {
        let task = Task::new(
            NewTask {
                platform: self.platform,
                action: self.action.to_owned(),
                user_id: USER,
                channel_id: self.channel_id,
                token_id: TOKEN,
                token_key: self.token_key.to_owned(),
                external_id: ExternalTaskId::new(self.external_id),
                quota: self.quota,
                data: TaskPayload::new(self.data.clone()),
                properties: TaskProperties {
                    model: self.model.to_owned(),
                    input: String::new(),
                },
            },
            &DefaultClock,
        );
        let mut persisted = task.to_persisted();
        persisted.status = self.status;
        self.progress.clone_into(&mut persisted.progress);
        Task::from_persisted(persisted)
    }
}

pub async fn seed_task(store: &impl TaskStore, seed: SeedTask) -> Task {
    let mut task = seed.build();
    let id = store.insert(&task).await.expect("task inserts");
    task.assign_id(id);
    task
}
