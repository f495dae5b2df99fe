//! Read side: paginated listings and caller-facing task projections.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::task::domain::{ExternalTaskId, Task, TaskError, TaskErrorKind, UserId};
use crate::task::ports::{TaskQuery, TaskStore, TaskStoreResult};

/// Page size used when the caller passes none.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Caller-facing view of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDto {
    /// Upstream identifier.
    pub task_id: String,
    /// Action name.
    pub action: String,
    /// Lifecycle status.
    pub status: String,
    /// Failure description.
    pub fail_reason: String,
    /// Submission time, unix seconds.
    pub submit_time: i64,
    /// Start time, unix seconds.
    pub start_time: i64,
    /// Finish time, unix seconds.
    pub finish_time: i64,
    /// Progress string.
    pub progress: String,
    /// Latest upstream payload.
    pub data: Value,
}

impl From<&Task> for TaskDto {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.external_id().as_str().to_owned(),
            action: task.action().to_owned(),
            status: task.status().as_str().to_owned(),
            fail_reason: task.fail_reason().to_owned(),
            submit_time: task.submit_time(),
            start_time: task.start_time(),
            finish_time: task.finish_time(),
            progress: task.progress().to_owned(),
            data: task.data().as_value().clone(),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Matching items across all pages.
    pub total: u64,
    /// One-based page number.
    pub page: i64,
    /// Page size.
    pub page_size: i64,
}

/// Listing and lookup service over the task store.
pub struct TaskQueryService<S>
where
    S: TaskStore,
{
    store: Arc<S>,
    default_page_size: i64,
}

impl<S> TaskQueryService<S>
where
    S: TaskStore,
{
    /// Creates a query service with the default page size of 10.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self {
            store,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the page size used for non-positive requests.
    #[must_use]
    pub const fn with_default_page_size(mut self, page_size: i64) -> Self {
        if page_size > 0 {
            self.default_page_size = page_size;
        }
        self
    }

    /// Lists tasks of every user, newest first.
    ///
    /// Pages below 1 are treated as 1; non-positive sizes use the default.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub async fn list_all(
        &self,
        page: i64,
        page_size: i64,
        filter: &TaskQuery,
    ) -> TaskStoreResult<Page<Task>> {
        let page_number = page.max(1);
        let size = if page_size > 0 {
            page_size
        } else {
            self.default_page_size
        };
        let offset = page_number.saturating_sub(1).saturating_mul(size);
        let items = self
            .store
            .list_paged(to_usize(offset), to_usize(size), filter)
            .await?;
        let total = self.store.count_filtered(filter).await?;
        Ok(Page {
            items,
            total,
            page: page_number,
            page_size: size,
        })
    }

    /// Lists one user's tasks, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: i64,
        page_size: i64,
        filter: &TaskQuery,
    ) -> TaskStoreResult<Page<Task>> {
        let scoped = TaskQuery {
            user_id: Some(user_id),
            ..filter.clone()
        };
        self.list_all(page, page_size, &scoped).await
    }

    /// Returns the caller's tasks among `task_ids`.
    ///
    /// # Errors
    ///
    /// Returns `get_tasks_failed` when the store fails.
    pub async fn fetch_by_ids(
        &self,
        user_id: UserId,
        task_ids: &[ExternalTaskId],
    ) -> Result<Vec<TaskDto>, TaskError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let tasks = self
            .store
            .get_by_task_ids(user_id, task_ids)
            .await
            .map_err(|err| TaskError::wrap(TaskErrorKind::GetTasksFailed, err))?;
        Ok(tasks.iter().map(TaskDto::from).collect())
    }

    /// Returns one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// Returns `task_not_exist` for unknown identifiers and `get_task_failed`
    /// when the store fails.
    pub async fn fetch_by_id(
        &self,
        user_id: UserId,
        task_id: &ExternalTaskId,
    ) -> Result<TaskDto, TaskError> {
        let task = self
            .store
            .get_by_task_id(user_id, task_id)
            .await
            .map_err(|err| TaskError::wrap(TaskErrorKind::GetTaskFailed, err))?
            .ok_or_else(|| TaskError::local(TaskErrorKind::TaskNotExist, "task_not_exist"))?;
        Ok(TaskDto::from(&task))
    }
}

fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
