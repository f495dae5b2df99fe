//! `PostgreSQL` store implementation for relay tasks.

use super::{
    models::{NewTaskRow, TaskFieldChangeset, TaskRow},
    schema::tasks,
};
use crate::task::{
    domain::{
        ChannelId, ExternalTaskId, PROGRESS_COMPLETE, PersistedTaskData, Platform, Task,
        TaskPayload, TaskProperties, TaskRecordId, TaskStatus, TokenId, UserId,
    },
    ports::{TaskFieldUpdate, TaskQuery, TaskStore, TaskStoreError, TaskStoreResult},
};
use async_trait::async_trait;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

/// `PostgreSQL` connection pool type used by the task store.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

const TERMINAL_STATUSES: [&str; 2] = ["SUCCESS", "FAILURE"];

/// `PostgreSQL`-backed task store.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
}

impl PostgresTaskStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

fn limit_of(limit: usize) -> TaskStoreResult<i64> {
    i64::try_from(limit).map_err(TaskStoreError::persistence)
}

fn external_ids(task_ids: &[ExternalTaskId]) -> Vec<String> {
    task_ids.iter().map(|id| id.as_str().to_owned()).collect()
}

fn changeset(fields: &TaskFieldUpdate) -> TaskFieldChangeset {
    TaskFieldChangeset {
        status: fields.status.map(|status| status.as_str().to_owned()),
        progress: fields.progress.clone(),
        fail_reason: fields.fail_reason.clone(),
    }
}

const fn is_empty_update(fields: &TaskFieldUpdate) -> bool {
    fields.status.is_none() && fields.progress.is_none() && fields.fail_reason.is_none()
}

/// Rows in a terminal status whose progress reached `100%`.
fn finished() -> diesel::dsl::And<
    diesel::dsl::EqAny<tasks::status, [&'static str; 2]>,
    diesel::dsl::Eq<tasks::progress, &'static str>,
> {
    tasks::status
        .eq_any(TERMINAL_STATUSES)
        .and(tasks::progress.eq(PROGRESS_COMPLETE))
}

fn filtered(filter: &TaskQuery) -> tasks::BoxedQuery<'static, Pg> {
    let mut query = tasks::table.into_boxed();
    if let Some(platform) = filter.platform {
        query = query.filter(tasks::platform.eq(platform.as_str()));
    }
    if let Some(task_id) = &filter.task_id {
        query = query.filter(tasks::task_id.eq(task_id.as_str().to_owned()));
    }
    if let Some(status) = filter.status {
        query = query.filter(tasks::status.eq(status.as_str()));
    }
    if let Some(action) = &filter.action {
        query = query.filter(tasks::action.eq(action.clone()));
    }
    if let Some(start) = filter.start_timestamp {
        query = query.filter(tasks::submit_time.ge(start));
    }
    if let Some(end) = filter.end_timestamp {
        query = query.filter(tasks::submit_time.le(end));
    }
    if let Some(channel_id) = filter.channel_id {
        query = query.filter(tasks::channel_id.eq(channel_id.value()));
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter(tasks::user_id.eq(user_id.value()));
    }
    query
}

fn load_rows(
    connection: &mut PgConnection,
    query: tasks::BoxedQuery<'static, Pg>,
) -> TaskStoreResult<Vec<Task>> {
    let rows = query
        .select(TaskRow::as_select())
        .load::<TaskRow>(connection)
        .map_err(TaskStoreError::persistence)?;
    rows.into_iter().map(row_to_task).collect()
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn get_unfinished_tasks(&self, limit: usize) -> TaskStoreResult<Vec<Task>> {
        let row_limit = limit_of(limit)?;
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(diesel::dsl::not(finished()))
                .order(tasks::id.asc())
                .limit(row_limit)
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)
                .map_err(TaskStoreError::persistence)?;
            Ok(decode_batch(rows))
        })
        .await
    }

    async fn get_by_task_id(
        &self,
        user_id: UserId,
        task_id: &ExternalTaskId,
    ) -> TaskStoreResult<Option<Task>> {
        let lookup = task_id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::user_id.eq(user_id.value()))
                .filter(tasks::task_id.eq(lookup))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(TaskStoreError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn get_by_task_ids(
        &self,
        user_id: UserId,
        task_ids: &[ExternalTaskId],
    ) -> TaskStoreResult<Vec<Task>> {
        let lookup = external_ids(task_ids);
        self.run_blocking(move |connection| {
            let query = tasks::table
                .into_boxed()
                .filter(tasks::user_id.eq(user_id.value()))
                .filter(tasks::task_id.eq_any(lookup))
                .order(tasks::id.asc());
            load_rows(connection, query)
        })
        .await
    }

    async fn bulk_update_by_id(
        &self,
        ids: &[TaskRecordId],
        fields: &TaskFieldUpdate,
    ) -> TaskStoreResult<u64> {
        if ids.is_empty() || is_empty_update(fields) {
            return Ok(0);
        }
        let targets: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        let changes = changeset(fields);
        self.run_blocking(move |connection| {
            let changed = diesel::update(tasks::table.filter(tasks::id.eq_any(targets)))
                .set(&changes)
                .execute(connection)
                .map_err(TaskStoreError::persistence)?;
            u64::try_from(changed).map_err(TaskStoreError::persistence)
        })
        .await
    }

    async fn bulk_update_by_task_id(
        &self,
        task_ids: &[ExternalTaskId],
        fields: &TaskFieldUpdate,
    ) -> TaskStoreResult<u64> {
        if task_ids.is_empty() || is_empty_update(fields) {
            return Ok(0);
        }
        let targets = external_ids(task_ids);
        let changes = changeset(fields);
        self.run_blocking(move |connection| {
            let open_rows = tasks::table
                .filter(tasks::task_id.eq_any(targets))
                .filter(diesel::dsl::not(finished()));
            let changed = diesel::update(open_rows)
                .set(&changes)
                .execute(connection)
                .map_err(TaskStoreError::persistence)?;
            u64::try_from(changed).map_err(TaskStoreError::persistence)
        })
        .await
    }

    async fn insert(&self, task: &Task) -> TaskStoreResult<TaskRecordId> {
        let row = new_row(task)?;
        self.run_blocking(move |connection| {
            let id = diesel::insert_into(tasks::table)
                .values(&row)
                .returning(tasks::id)
                .get_result::<i64>(connection)
                .map_err(TaskStoreError::persistence)?;
            Ok(TaskRecordId::new(id))
        })
        .await
    }

    async fn update(&self, task: &Task) -> TaskStoreResult<()> {
        let id = task.id();
        let row = new_row(task)?;
        self.run_blocking(move |connection| {
            let changed = diesel::update(tasks::table.find(id.value()))
                .set(&row)
                .execute(connection)
                .map_err(TaskStoreError::persistence)?;
            if changed == 0 {
                return Err(TaskStoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn list_paged(
        &self,
        offset: usize,
        limit: usize,
        filter: &TaskQuery,
    ) -> TaskStoreResult<Vec<Task>> {
        let row_offset = limit_of(offset)?;
        let row_limit = limit_of(limit)?;
        let query_filter = filter.clone();
        self.run_blocking(move |connection| {
            let query = filtered(&query_filter)
                .order(tasks::id.desc())
                .offset(row_offset)
                .limit(row_limit);
            load_rows(connection, query)
        })
        .await
    }

    async fn count_filtered(&self, filter: &TaskQuery) -> TaskStoreResult<u64> {
        let query_filter = filter.clone();
        self.run_blocking(move |connection| {
            let total = filtered(&query_filter)
                .count()
                .get_result::<i64>(connection)
                .map_err(TaskStoreError::persistence)?;
            u64::try_from(total).map_err(TaskStoreError::persistence)
        })
        .await
    }
}

/// Converts a task into its insert row.
///
/// # Errors
///
/// Returns [`TaskStoreError::Persistence`] when the metadata cannot be
/// serialized.
pub fn new_row(task: &Task) -> TaskStoreResult<NewTaskRow> {
    let properties =
        serde_json::to_value(task.properties()).map_err(TaskStoreError::persistence)?;
    Ok(NewTaskRow {
        task_id: task.external_id().as_str().to_owned(),
        platform: task.platform().as_str().to_owned(),
        action: task.action().to_owned(),
        user_id: task.user_id().value(),
        channel_id: task.channel_id().value(),
        token_id: task.token_id().value(),
        token_key: task.token_key().to_owned(),
        status: task.status().as_str().to_owned(),
        progress: task.progress().to_owned(),
        submit_time: task.submit_time(),
        start_time: task.start_time(),
        finish_time: task.finish_time(),
        fail_reason: task.fail_reason().to_owned(),
        quota: task.quota(),
        data: task.data().as_value().clone(),
        properties,
    })
}

/// Converts a polling batch, skipping rows that no longer decode.
///
/// Skipped rows are logged with their record id and left untouched.
#[must_use]
pub fn decode_batch(rows: Vec<TaskRow>) -> Vec<Task> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match row_to_task(row) {
                Ok(task) => Some(task),
                Err(err) => {
                    tracing::warn!(
                        target: "taskrelay::store",
                        record_id = id,
                        error = %err,
                        "skipping undecodable task row"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Reconstructs a task from a stored row.
///
/// # Errors
///
/// Returns [`TaskStoreError::Persistence`] when the platform, status, or
/// metadata columns hold unknown values.
pub fn row_to_task(row: TaskRow) -> TaskStoreResult<Task> {
    let TaskRow {
        id,
        task_id,
        platform: persisted_platform,
        action,
        user_id,
        channel_id,
        token_id,
        token_key,
        status: persisted_status,
        progress,
        submit_time,
        start_time,
        finish_time,
        fail_reason,
        quota,
        data,
        properties: persisted_properties,
    } = row;

    let platform =
        Platform::try_from(persisted_platform.as_str()).map_err(TaskStoreError::persistence)?;
    let status =
        TaskStatus::try_from(persisted_status.as_str()).map_err(TaskStoreError::persistence)?;
    let properties = if persisted_properties.is_null() {
        TaskProperties::default()
    } else {
        serde_json::from_value::<TaskProperties>(persisted_properties)
            .map_err(TaskStoreError::persistence)?
    };

    Ok(Task::from_persisted(PersistedTaskData {
        id: TaskRecordId::new(id),
        external_id: ExternalTaskId::new(task_id),
        platform,
        action,
        user_id: UserId::new(user_id),
        channel_id: ChannelId::new(channel_id),
        token_id: TokenId::new(token_id),
        token_key,
        status,
        progress,
        submit_time,
        start_time,
        finish_time,
        fail_reason,
        quota,
        data: TaskPayload::new(data),
        properties,
    }))
}
