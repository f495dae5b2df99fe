//! Store port for task persistence, lookup, and bulk status updates.

use crate::task::domain::{
    ChannelId, ExternalTaskId, Platform, Task, TaskRecordId, TaskStatus, UserId,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Task persistence contract.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Returns up to `limit` tasks that are not yet finished, oldest first.
    async fn get_unfinished_tasks(&self, limit: usize) -> TaskStoreResult<Vec<Task>>;

    /// Finds a user's task by upstream identifier.
    ///
    /// Returns `None` when the user owns no such task.
    async fn get_by_task_id(
        &self,
        user_id: UserId,
        task_id: &ExternalTaskId,
    ) -> TaskStoreResult<Option<Task>>;

    /// Returns the user's tasks matching any of the upstream identifiers.
    async fn get_by_task_ids(
        &self,
        user_id: UserId,
        task_ids: &[ExternalTaskId],
    ) -> TaskStoreResult<Vec<Task>>;

    /// Applies `fields` to every task with one of the store identifiers.
    ///
    /// Returns the number of rows changed.
    async fn bulk_update_by_id(
        &self,
        ids: &[TaskRecordId],
        fields: &TaskFieldUpdate,
    ) -> TaskStoreResult<u64>;

    /// Applies `fields` to every unfinished task with one of the upstream
    /// identifiers. Finished rows keep their terminal state.
    ///
    /// Returns the number of rows changed.
    async fn bulk_update_by_task_id(
        &self,
        task_ids: &[ExternalTaskId],
        fields: &TaskFieldUpdate,
    ) -> TaskStoreResult<u64>;

    /// Stores a new task and returns its assigned identifier.
    async fn insert(&self, task: &Task) -> TaskStoreResult<TaskRecordId>;

    /// Persists every mutable field of an existing task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    async fn update(&self, task: &Task) -> TaskStoreResult<()>;

    /// Returns one page of tasks matching `filter`, newest first.
    async fn list_paged(
        &self,
        offset: usize,
        limit: usize,
        filter: &TaskQuery,
    ) -> TaskStoreResult<Vec<Task>>;

    /// Counts the tasks matching `filter`.
    async fn count_filtered(&self, filter: &TaskQuery) -> TaskStoreResult<u64>;
}

/// Column values written by the bulk update operations.
///
/// `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFieldUpdate {
    /// New status.
    pub status: Option<TaskStatus>,
    /// New progress string.
    pub progress: Option<String>,
    /// New failure description.
    pub fail_reason: Option<String>,
}

impl TaskFieldUpdate {
    /// Marks tasks as finished in failure.
    #[must_use]
    pub fn failure() -> Self {
        Self {
            status: Some(TaskStatus::Failure),
            progress: Some(crate::task::domain::PROGRESS_COMPLETE.to_owned()),
            fail_reason: None,
        }
    }

    /// Sets the failure description.
    #[must_use]
    pub fn with_fail_reason(mut self, reason: impl Into<String>) -> Self {
        self.fail_reason = Some(reason.into());
        self
    }
}

/// Filter used by the paginated listing operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    /// Restrict to one platform.
    pub platform: Option<Platform>,
    /// Restrict to one upstream identifier.
    pub task_id: Option<ExternalTaskId>,
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
    /// Restrict to one action.
    pub action: Option<String>,
    /// Lower bound on submit time, inclusive.
    pub start_timestamp: Option<i64>,
    /// Upper bound on submit time, inclusive.
    pub end_timestamp: Option<i64>,
    /// Restrict to one channel. Used by the administrative listing.
    pub channel_id: Option<ChannelId>,
    /// Restrict to one owner. Set by the self-scoped listing.
    pub user_id: Option<UserId>,
}

impl TaskQuery {
    /// Returns `true` when `task` satisfies every populated criterion.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.platform.is_none_or(|platform| platform == task.platform())
            && self
                .task_id
                .as_ref()
                .is_none_or(|task_id| task_id == task.external_id())
            && self.status.is_none_or(|status| status == task.status())
            && self
                .action
                .as_deref()
                .is_none_or(|action| action == task.action())
            && self
                .start_timestamp
                .is_none_or(|start| task.submit_time() >= start)
            && self
                .end_timestamp
                .is_none_or(|end| task.submit_time() <= end)
            && self
                .channel_id
                .is_none_or(|channel_id| channel_id == task.channel_id())
            && self.user_id.is_none_or(|user_id| user_id == task.user_id())
    }
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskRecordId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
