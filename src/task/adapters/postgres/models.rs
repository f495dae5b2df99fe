//! Diesel row models for task persistence.

use super::schema::tasks;
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for task records.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Store-assigned identifier.
    pub id: i64,
    /// Upstream task identifier.
    pub task_id: String,
    /// Platform code.
    pub platform: String,
    /// Action name.
    pub action: String,
    /// Owning user.
    pub user_id: i64,
    /// Handling channel.
    pub channel_id: i64,
    /// Calling token.
    pub token_id: i64,
    /// Calling token key.
    pub token_key: String,
    /// Status code.
    pub status: String,
    /// Progress string.
    pub progress: String,
    /// Submit time in unix seconds.
    pub submit_time: i64,
    /// Start time in unix seconds.
    pub start_time: i64,
    /// Finish time in unix seconds.
    pub finish_time: i64,
    /// Failure description.
    pub fail_reason: String,
    /// Charged quota.
    pub quota: i64,
    /// Upstream payload.
    pub data: Value,
    /// Adaptor metadata.
    pub properties: Value,
}

/// Insert and full-update model for task records.
#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    /// Upstream task identifier.
    pub task_id: String,
    /// Platform code.
    pub platform: String,
    /// Action name.
    pub action: String,
    /// Owning user.
    pub user_id: i64,
    /// Handling channel.
    pub channel_id: i64,
    /// Calling token.
    pub token_id: i64,
    /// Calling token key.
    pub token_key: String,
    /// Status code.
    pub status: String,
    /// Progress string.
    pub progress: String,
    /// Submit time in unix seconds.
    pub submit_time: i64,
    /// Start time in unix seconds.
    pub start_time: i64,
    /// Finish time in unix seconds.
    pub finish_time: i64,
    /// Failure description.
    pub fail_reason: String,
    /// Charged quota.
    pub quota: i64,
    /// Upstream payload.
    pub data: Value,
    /// Adaptor metadata.
    pub properties: Value,
}

/// Partial update written by the bulk operations; `None` columns are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, AsChangeset)]
#[diesel(table_name = tasks)]
pub(super) struct TaskFieldChangeset {
    pub(super) status: Option<String>,
    pub(super) progress: Option<String>,
    pub(super) fail_reason: Option<String>,
}
