//! Background reconciliation of unfinished tasks against their upstreams.
//!
//! Each cycle loads a batch of unfinished tasks, fails the ones that can never
//! be polled, and fans out one status sweep per channel. A task that turns
//! into a failure is refunded before its row is written; refunds whose row
//! could not be written are remembered so the retry does not pay twice.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use mockable::Clock;
use thiserror::Error;
use tokio::sync::Mutex;

use super::RelayPorts;
use crate::relay::{FetchQuery, TaskAdaptor};
use crate::task::domain::{
    ChannelId, ExternalTaskId, Platform, Task, TaskRecordId, UpstreamTaskRecord,
};
use crate::task::ports::{
    Channel, QuotaLedger, TaskFieldUpdate, TaskStore, TaskStoreError,
};

/// Default number of unfinished tasks loaded per cycle.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Paces the reconciliation loop.
#[async_trait]
pub trait Ticker: Send {
    /// Waits until the next cycle is due; `false` stops the loop.
    async fn tick(&mut self) -> bool;
}

/// Ticker sleeping a fixed period before every cycle.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTicker {
    period: Duration,
}

impl IntervalTicker {
    /// Creates a ticker with the given period.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self { period }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        tokio::time::sleep(self.period).await;
        true
    }
}

/// Errors that abort a whole cycle.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// The unfinished batch could not be loaded.
    #[error("failed to load unfinished tasks: {0}")]
    Load(#[from] TaskStoreError),
}

/// Counters describing one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Unfinished tasks loaded.
    pub loaded: usize,
    /// Tasks failed without polling: orphans, unknown platforms and
    /// unreachable channels.
    pub force_failed: usize,
    /// Status queries sent.
    pub queries: usize,
    /// Status queries that timed out, failed or returned garbage.
    pub failed_queries: usize,
    /// Tasks whose row changed.
    pub updated: usize,
    /// Refunds paid.
    pub refunds: usize,
    /// Refunds that failed; their tasks stay unfinished for the next cycle.
    pub refund_failures: usize,
    /// Row writes that failed and will be retried.
    pub persist_failures: usize,
}

impl CycleReport {
    fn absorb(&mut self, other: Self) {
        self.force_failed = self.force_failed.saturating_add(other.force_failed);
        self.queries = self.queries.saturating_add(other.queries);
        self.failed_queries = self.failed_queries.saturating_add(other.failed_queries);
        self.updated = self.updated.saturating_add(other.updated);
        self.refunds = self.refunds.saturating_add(other.refunds);
        self.refund_failures = self.refund_failures.saturating_add(other.refund_failures);
        self.persist_failures = self.persist_failures.saturating_add(other.persist_failures);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compensation {
    Paid,
    AlreadyPaid,
    Failed,
}

/// Tasks already refunded whose failed row has not been committed yet.
///
/// The set lives in process memory and belongs to one
/// [`ReconciliationService`]. An entry is dropped once its row commits, so it
/// stays for as long as the store keeps refusing that write. A restart
/// between the refund and the commit loses the entry, and the next cycle
/// refunds the task again. Run a single reconciler per store, and alert on
/// [`CycleReport::persist_failures`] so a stuck commit is noticed while its
/// guard is still held.
#[derive(Debug, Default)]
pub struct PendingCompensations {
    ids: Mutex<HashSet<TaskRecordId>>,
}

impl PendingCompensations {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `id` was refunded but not committed.
    pub async fn contains(&self, id: TaskRecordId) -> bool {
        self.ids.lock().await.contains(&id)
    }

    /// Returns the number of pending refunds.
    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    /// Returns `true` when no refund is pending.
    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }

    async fn remember(&self, ids: impl IntoIterator<Item = TaskRecordId> + Send) {
        self.ids.lock().await.extend(ids);
    }

    async fn forget(&self, ids: &[TaskRecordId]) {
        let mut pending = self.ids.lock().await;
        for id in ids {
            pending.remove(id);
        }
    }
}

/// Periodic poller keeping unfinished tasks in step with their upstreams.
pub struct ReconciliationService<S, L, C>
where
    S: TaskStore,
    L: QuotaLedger,
    C: Clock + Send + Sync,
{
    ports: RelayPorts<S, L, C>,
    batch_size: usize,
    pending: Arc<PendingCompensations>,
}

impl<S, L, C> ReconciliationService<S, L, C>
where
    S: TaskStore,
    L: QuotaLedger,
    C: Clock + Send + Sync,
{
    /// Creates a reconciliation service loading `batch_size` tasks per cycle.
    #[must_use]
    pub fn new(ports: RelayPorts<S, L, C>, batch_size: usize) -> Self {
        Self {
            ports,
            batch_size,
            pending: Arc::new(PendingCompensations::new()),
        }
    }

    /// Returns the refunds awaiting a row commit.
    #[must_use]
    pub fn pending_compensations(&self) -> Arc<PendingCompensations> {
        Arc::clone(&self.pending)
    }

    /// Runs cycles until `ticker` stops. Cycle failures are logged.
    pub async fn run(&self, ticker: &mut dyn Ticker) {
        while ticker.tick().await {
            tracing::info!(target: "taskrelay::reconcile", "task polling started");
            match self.run_cycle().await {
                Ok(report) => tracing::info!(
                    target: "taskrelay::reconcile",
                    loaded = report.loaded,
                    updated = report.updated,
                    refunds = report.refunds,
                    failed_queries = report.failed_queries,
                    "task polling finished"
                ),
                Err(err) => tracing::error!(
                    target: "taskrelay::reconcile",
                    error = %err,
                    "task polling aborted"
                ),
            }
        }
    }

    /// Runs one reconciliation cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Load`] when the unfinished batch cannot be
    /// read. Failures inside a channel sweep are logged and counted instead.
    pub async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let tasks = self.ports.store.get_unfinished_tasks(self.batch_size).await?;
        let mut report = CycleReport {
            loaded: tasks.len(),
            ..CycleReport::default()
        };
        let (orphans, routed): (Vec<Task>, Vec<Task>) = tasks
            .into_iter()
            .partition(|task| task.external_id().is_empty());
        if !orphans.is_empty() {
            report.absorb(self.fail_orphans(&orphans).await);
        }

        let mut by_platform: BTreeMap<Platform, BTreeMap<ChannelId, Vec<Task>>> = BTreeMap::new();
        for task in routed {
            by_platform
                .entry(task.platform())
                .or_default()
                .entry(task.channel_id())
                .or_default()
                .push(task);
        }

        let mut sweeps = Vec::new();
        for (platform, channels) in by_platform {
            let Some(adaptor) = self.ports.registry.get(platform) else {
                let stranded: Vec<Task> = channels.into_values().flatten().collect();
                report.absorb(self.fail_unroutable(platform, &stranded).await);
                continue;
            };
            for (channel_id, channel_tasks) in channels {
                sweeps.push(self.sweep_channel(Arc::clone(&adaptor), channel_id, channel_tasks));
            }
        }
        for sweep in join_all(sweeps).await {
            report.absorb(sweep);
        }
        Ok(report)
    }

    async fn fail_orphans(&self, orphans: &[Task]) -> CycleReport {
        tracing::info!(
            target: "taskrelay::reconcile",
            count = orphans.len(),
            "failing tasks without an upstream id"
        );
        self.fail_batch(orphans, &TaskFieldUpdate::failure()).await
    }

    async fn fail_unroutable(&self, platform: Platform, tasks: &[Task]) -> CycleReport {
        tracing::error!(
            target: "taskrelay::reconcile",
            platform = platform.as_str(),
            count = tasks.len(),
            "no adaptor registered for platform"
        );
        let fields = TaskFieldUpdate::failure()
            .with_fail_reason(format!("no adaptor registered for platform: {platform}"));
        self.fail_batch(tasks, &fields).await
    }

    async fn fail_channel(&self, channel_id: ChannelId, tasks: &[Task]) -> CycleReport {
        let fields = TaskFieldUpdate::failure().with_fail_reason(format!(
            "failed to get channel info, channel ID: {channel_id}"
        ));
        self.fail_batch(tasks, &fields).await
    }

    /// Refunds and fails `tasks` in one bulk write keyed by record id.
    ///
    /// Tasks whose refund could not be paid are left untouched so the next
    /// cycle retries them.
    async fn fail_batch(&self, tasks: &[Task], fields: &TaskFieldUpdate) -> CycleReport {
        let mut report = CycleReport::default();
        let mut settled = Vec::new();
        let mut ready: Vec<&Task> = Vec::with_capacity(tasks.len());
        for task in tasks {
            if task.owes_refund_on_failure() {
                match self.compensate(task).await {
                    Compensation::Paid => {
                        report.refunds = report.refunds.saturating_add(1);
                        settled.push(task.id());
                    }
                    Compensation::AlreadyPaid => settled.push(task.id()),
                    Compensation::Failed => {
                        report.refund_failures = report.refund_failures.saturating_add(1);
                        continue;
                    }
                }
            }
            ready.push(task);
        }
        if ready.is_empty() {
            return report;
        }
        let ids: Vec<TaskRecordId> = ready.iter().map(|task| task.id()).collect();
        match self.ports.store.bulk_update_by_id(&ids, fields).await {
            Ok(_) => {
                self.pending.forget(&ids).await;
                report.force_failed = ready.len();
            }
            Err(err) => {
                tracing::error!(
                    target: "taskrelay::reconcile",
                    count = ready.len(),
                    error = %err,
                    "failed to mark tasks as failed"
                );
                self.pending.remember(settled).await;
                report.persist_failures = report.persist_failures.saturating_add(1);
            }
        }
        report
    }

    async fn sweep_channel(
        &self,
        adaptor: Arc<dyn TaskAdaptor>,
        channel_id: ChannelId,
        tasks: Vec<Task>,
    ) -> CycleReport {
        tracing::debug!(
            target: "taskrelay::reconcile",
            platform = adaptor.platform().as_str(),
            channel_id = %channel_id,
            count = tasks.len(),
            "polling channel"
        );
        let channel = match self.ports.channels.get_channel(channel_id).await {
            Ok(channel) => channel,
            Err(err) => {
                tracing::warn!(
                    target: "taskrelay::reconcile",
                    channel_id = %channel_id,
                    error = %err,
                    "channel lookup failed"
                );
                return self.fail_channel(channel_id, &tasks).await;
            }
        };
        let queries = adaptor.plan_fetch(&tasks);
        let mut index: HashMap<ExternalTaskId, Task> = tasks
            .into_iter()
            .map(|task| (task.external_id().clone(), task))
            .collect();
        let mut report = CycleReport::default();
        for query in queries {
            report.queries = report.queries.saturating_add(1);
            let Some(records) = self.poll(adaptor.as_ref(), &channel, &query).await else {
                report.failed_queries = report.failed_queries.saturating_add(1);
                continue;
            };
            for record in records {
                let Some(task) = index.get_mut(&record.task_id) else {
                    tracing::debug!(
                        target: "taskrelay::reconcile",
                        task_id = %record.task_id,
                        "upstream reported an unknown task"
                    );
                    continue;
                };
                report.absorb(self.reconcile_task(task, record).await);
            }
        }
        report
    }

    async fn poll(
        &self,
        adaptor: &dyn TaskAdaptor,
        channel: &Channel,
        query: &FetchQuery,
    ) -> Option<Vec<UpstreamTaskRecord>> {
        let deadline = self.ports.client.fetch_timeout();
        let fetched = tokio::time::timeout(
            deadline,
            adaptor.fetch_task(&self.ports.client, &channel.base_url, &channel.key, query),
        )
        .await;
        let body = match fetched {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => {
                tracing::warn!(
                    target: "taskrelay::reconcile",
                    channel_id = %channel.id,
                    route = %query.route,
                    kind = %err.kind(),
                    error = %err,
                    "status query failed"
                );
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    target: "taskrelay::reconcile",
                    channel_id = %channel.id,
                    route = %query.route,
                    timeout_ms = deadline.as_millis(),
                    "status query timed out"
                );
                return None;
            }
        };
        match adaptor.parse_fetch_response(query, &body) {
            Ok(records) => Some(records),
            Err(err) => {
                tracing::warn!(
                    target: "taskrelay::reconcile",
                    channel_id = %channel.id,
                    kind = %err.kind(),
                    error = %err,
                    "status response rejected"
                );
                None
            }
        }
    }

    async fn reconcile_task(&self, task: &mut Task, record: UpstreamTaskRecord) -> CycleReport {
        let mut report = CycleReport::default();
        if !task.needs_update(&record) {
            return report;
        }
        let outcome = match task.apply_upstream(record, &*self.ports.clock) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::debug!(target: "taskrelay::reconcile", error = %err, "update skipped");
                return report;
            }
        };
        let refund_due = outcome.became_failed && task.quota() != 0;
        if refund_due {
            tracing::info!(
                target: "taskrelay::reconcile",
                task_id = %task.external_id(),
                reason = task.fail_reason(),
                "task failed upstream"
            );
            match self.compensate(task).await {
                Compensation::Paid => report.refunds = 1,
                Compensation::AlreadyPaid => {}
                Compensation::Failed => {
                    report.refund_failures = 1;
                    return report;
                }
            }
        }
        match self.ports.store.update(task).await {
            Ok(()) => {
                self.pending.forget(&[task.id()]).await;
                report.updated = 1;
            }
            Err(err) => {
                tracing::error!(
                    target: "taskrelay::reconcile",
                    task_id = %task.external_id(),
                    error = %err,
                    "failed to persist task update"
                );
                if refund_due {
                    self.pending.remember([task.id()]).await;
                }
                report.persist_failures = 1;
            }
        }
        report
    }

    /// Refunds a failed task unless an earlier cycle already did.
    async fn compensate(&self, task: &Task) -> Compensation {
        if self.pending.contains(task.id()).await {
            tracing::debug!(
                target: "taskrelay::reconcile",
                task_id = %task.external_id(),
                "refund already paid; awaiting row commit"
            );
            return Compensation::AlreadyPaid;
        }
        let quota = task.quota();
        if let Err(err) = self.ports.ledger.increase_balance(task.user_id(), quota).await {
            tracing::error!(
                target: "taskrelay::reconcile",
                user_id = %task.user_id(),
                task_id = %task.external_id(),
                error = %err,
                "failed to refund quota"
            );
            return Compensation::Failed;
        }
        let model = task.properties().model.as_str();
        let label = if model.is_empty() { "async" } else { model };
        let content = format!(
            "{label} task failed {}, refund {quota}",
            task.external_id()
        );
        if let Err(err) = self
            .ports
            .ledger
            .record_system_log(task.user_id(), content)
            .await
        {
            tracing::warn!(
                target: "taskrelay::reconcile",
                user_id = %task.user_id(),
                error = %err,
                "failed to record refund log"
            );
        }
        Compensation::Paid
    }
}
