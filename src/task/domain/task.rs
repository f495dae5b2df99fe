//! Task aggregate root and the upstream reconciliation rules applied to it.

use super::{
    ChannelId, ExternalTaskId, PROGRESS_COMPLETE, PROGRESS_INITIAL, Platform, TaskDomainError,
    TaskPayload, TaskRecordId, TaskStatus, TokenId, UserId,
};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Adaptor-specific metadata needed after submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProperties {
    /// Model the task was billed and routed under.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    /// Caller prompt or input summary, when the adaptor records one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input: String,
}

/// Parameter object for creating a task after a successful submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Upstream platform.
    pub platform: Platform,
    /// Normalized action name.
    pub action: String,
    /// Owning user.
    pub user_id: UserId,
    /// Channel that accepted the submission.
    pub channel_id: ChannelId,
    /// Calling token.
    pub token_id: TokenId,
    /// Calling token key, used for per-client upstream routing.
    pub token_key: String,
    /// Identifier assigned by the upstream.
    pub external_id: ExternalTaskId,
    /// Quota attributable to the task.
    pub quota: i64,
    /// Raw submit response payload.
    pub data: TaskPayload,
    /// Adaptor metadata.
    pub properties: TaskProperties,
}

/// Parameter object for reconstructing a persisted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Store-assigned identifier.
    pub id: TaskRecordId,
    /// Upstream identifier.
    pub external_id: ExternalTaskId,
    /// Upstream platform.
    pub platform: Platform,
    /// Action name.
    pub action: String,
    /// Owning user.
    pub user_id: UserId,
    /// Handling channel.
    pub channel_id: ChannelId,
    /// Calling token.
    pub token_id: TokenId,
    /// Calling token key.
    pub token_key: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Progress percentage string.
    pub progress: String,
    /// Submit timestamp in unix seconds.
    pub submit_time: i64,
    /// Start timestamp in unix seconds.
    pub start_time: i64,
    /// Finish timestamp in unix seconds.
    pub finish_time: i64,
    /// Failure description.
    pub fail_reason: String,
    /// Charged quota.
    pub quota: i64,
    /// Upstream payload.
    pub data: TaskPayload,
    /// Adaptor metadata.
    pub properties: TaskProperties,
}

/// One task's state as reported by an upstream status query.
///
/// `None` and empty or zero fields mean "not reported" and never overwrite a
/// populated local value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamTaskRecord {
    /// Upstream identifier the record refers to.
    pub task_id: ExternalTaskId,
    /// Status mapped into the internal vocabulary.
    pub status: Option<TaskStatus>,
    /// Upstream progress string.
    pub progress: Option<String>,
    /// Upstream failure description.
    pub fail_reason: Option<String>,
    /// Upstream submit time (unix seconds).
    pub submit_time: i64,
    /// Upstream start time (unix seconds).
    pub start_time: i64,
    /// Upstream finish time (unix seconds).
    pub finish_time: i64,
    /// Replacement result payload.
    pub data: Option<TaskPayload>,
}

impl UpstreamTaskRecord {
    /// Creates an empty record for the given upstream identifier.
    #[must_use]
    pub fn new(task_id: ExternalTaskId) -> Self {
        Self {
            task_id,
            ..Self::default()
        }
    }
}

/// Effect of applying an upstream record to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskUpdateOutcome {
    /// Status before the update.
    pub previous_status: TaskStatus,
    /// Status after the update.
    pub status: TaskStatus,
    /// Whether this update moved the task into failure.
    pub became_failed: bool,
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    id: TaskRecordId,
    external_id: ExternalTaskId,
    platform: Platform,
    action: String,
    user_id: UserId,
    channel_id: ChannelId,
    token_id: TokenId,
    token_key: String,
    status: TaskStatus,
    progress: String,
    submit_time: i64,
    start_time: i64,
    finish_time: i64,
    fail_reason: String,
    quota: i64,
    data: TaskPayload,
    properties: TaskProperties,
}

impl Task {
    /// Creates a task for a submission the upstream has just accepted.
    #[must_use]
    pub fn new(new_task: NewTask, clock: &impl Clock) -> Self {
        let NewTask {
            platform,
            action,
            user_id,
            channel_id,
            token_id,
            token_key,
            external_id,
            quota,
            data,
            properties,
        } = new_task;

        Self {
            id: TaskRecordId::default(),
            external_id,
            platform,
            action,
            user_id,
            channel_id,
            token_id,
            token_key,
            status: TaskStatus::NotStart,
            progress: PROGRESS_INITIAL.to_owned(),
            submit_time: unix_now(clock),
            start_time: 0,
            finish_time: 0,
            fail_reason: String::new(),
            quota,
            data,
            properties,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            external_id: data.external_id,
            platform: data.platform,
            action: data.action,
            user_id: data.user_id,
            channel_id: data.channel_id,
            token_id: data.token_id,
            token_key: data.token_key,
            status: data.status,
            progress: data.progress,
            submit_time: data.submit_time,
            start_time: data.start_time,
            finish_time: data.finish_time,
            fail_reason: data.fail_reason,
            quota: data.quota,
            data: data.data,
            properties: data.properties,
        }
    }

    /// Returns every field in persisted form.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedTaskData {
        PersistedTaskData {
            id: self.id,
            external_id: self.external_id.clone(),
            platform: self.platform,
            action: self.action.clone(),
            user_id: self.user_id,
            channel_id: self.channel_id,
            token_id: self.token_id,
            token_key: self.token_key.clone(),
            status: self.status,
            progress: self.progress.clone(),
            submit_time: self.submit_time,
            start_time: self.start_time,
            finish_time: self.finish_time,
            fail_reason: self.fail_reason.clone(),
            quota: self.quota,
            data: self.data.clone(),
            properties: self.properties.clone(),
        }
    }

    /// Records the identifier assigned by the store on insert.
    pub const fn assign_id(&mut self, id: TaskRecordId) {
        self.id = id;
    }

    /// Returns the store-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> TaskRecordId {
        self.id
    }

    /// Returns the upstream identifier.
    #[must_use]
    pub const fn external_id(&self) -> &ExternalTaskId {
        &self.external_id
    }

    /// Returns the upstream platform.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Returns the action name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the owning user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the handling channel.
    #[must_use]
    pub const fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Returns the calling token.
    #[must_use]
    pub const fn token_id(&self) -> TokenId {
        self.token_id
    }

    /// Returns the calling token key.
    #[must_use]
    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the progress string.
    #[must_use]
    pub fn progress(&self) -> &str {
        &self.progress
    }

    /// Returns the submit time in unix seconds.
    #[must_use]
    pub const fn submit_time(&self) -> i64 {
        self.submit_time
    }

    /// Returns the start time in unix seconds, zero when unset.
    #[must_use]
    pub const fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Returns the finish time in unix seconds, zero when unset.
    #[must_use]
    pub const fn finish_time(&self) -> i64 {
        self.finish_time
    }

    /// Returns the failure description.
    #[must_use]
    pub fn fail_reason(&self) -> &str {
        &self.fail_reason
    }

    /// Returns the quota charged for the task.
    #[must_use]
    pub const fn quota(&self) -> i64 {
        self.quota
    }

    /// Returns the upstream payload.
    #[must_use]
    pub const fn data(&self) -> &TaskPayload {
        &self.data
    }

    /// Returns the adaptor metadata.
    #[must_use]
    pub const fn properties(&self) -> &TaskProperties {
        &self.properties
    }

    /// Returns `true` once the task is terminal and its progress is complete.
    ///
    /// Finished tasks are exempt from polling.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal() && self.progress == PROGRESS_COMPLETE
    }

    /// Returns `true` when failing this task must refund its quota.
    #[must_use]
    pub fn owes_refund_on_failure(&self) -> bool {
        self.status != TaskStatus::Failure && self.quota != 0
    }

    /// Returns whether `record` differs materially from the local state.
    ///
    /// Finished tasks never need an update.
    #[must_use]
    pub fn needs_update(&self, record: &UpstreamTaskRecord) -> bool {
        if self.is_finished() {
            return false;
        }
        if self.status.is_terminal() {
            return true;
        }
        let status_changed = record
            .status
            .is_some_and(|next| next != self.status && self.status.can_transition_to(next));
        let progress_changed = non_empty(record.progress.as_deref())
            .is_some_and(|progress| progress != self.progress);
        let reason_changed = non_empty(record.fail_reason.as_deref())
            .is_some_and(|reason| reason != self.fail_reason);
        let times_changed = differs_when_set(record.submit_time, self.submit_time)
            || differs_when_set(record.start_time, self.start_time)
            || differs_when_set(record.finish_time, self.finish_time);
        let data_changed = record
            .data
            .as_ref()
            .is_some_and(|data| !data.same_content(&self.data));

        status_changed || progress_changed || reason_changed || times_changed || data_changed
    }

    /// Merges an upstream record into the task.
    ///
    /// Populated local fields are kept when the upstream reports nothing for
    /// them, statuses only move forward, and a terminal result always carries
    /// complete progress.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::AlreadyFinished`] for finished tasks.
    pub fn apply_upstream(
        &mut self,
        record: UpstreamTaskRecord,
        clock: &impl Clock,
    ) -> Result<TaskUpdateOutcome, TaskDomainError> {
        if self.is_finished() {
            return Err(TaskDomainError::AlreadyFinished(self.external_id.clone()));
        }
        let previous_status = self.status;
        let UpstreamTaskRecord {
            status,
            progress,
            fail_reason,
            submit_time,
            start_time,
            finish_time,
            data,
            ..
        } = record;

        if let Some(next) = status {
            self.transition_to(next);
        }
        if let Some(reported) = non_empty(progress.as_deref()) {
            reported.clone_into(&mut self.progress);
        }
        if let Some(reason) = non_empty(fail_reason.as_deref()) {
            reason.clone_into(&mut self.fail_reason);
        }
        self.submit_time = prefer_reported(submit_time, self.submit_time);
        self.start_time = prefer_reported(start_time, self.start_time);
        self.finish_time = prefer_reported(finish_time, self.finish_time);
        if let Some(payload) = data {
            self.data = payload;
        }
        self.stamp_lifecycle_times(clock);

        Ok(TaskUpdateOutcome {
            previous_status,
            status: self.status,
            became_failed: previous_status != TaskStatus::Failure
                && self.status == TaskStatus::Failure,
        })
    }

    /// Forces the task into failure with a diagnostic reason.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::AlreadyFinished`] for finished tasks.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<TaskUpdateOutcome, TaskDomainError> {
        let mut record = UpstreamTaskRecord::new(self.external_id.clone());
        record.status = Some(TaskStatus::Failure);
        record.fail_reason = Some(reason.into());
        self.apply_upstream(record, clock)
    }

    /// Moves the status forward; regressions and `Unknown` reports are ignored.
    fn transition_to(&mut self, next: TaskStatus) {
        if self.status.can_transition_to(next) {
            self.status = next;
        }
    }

    fn stamp_lifecycle_times(&mut self, clock: &impl Clock) {
        let started = matches!(
            self.status,
            TaskStatus::InProgress | TaskStatus::Success | TaskStatus::Failure
        );
        if started && self.start_time == 0 {
            self.start_time = unix_now(clock);
        }
        if self.status.is_terminal() {
            if self.finish_time == 0 {
                self.finish_time = unix_now(clock);
            }
            PROGRESS_COMPLETE.clone_into(&mut self.progress);
        }
    }
}

fn unix_now(clock: &impl Clock) -> i64 {
    clock.utc().timestamp()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty())
}

const fn differs_when_set(reported: i64, local: i64) -> bool {
    reported != 0 && reported != local
}

const fn prefer_reported(reported: i64, local: i64) -> i64 {
    if reported == 0 { local } else { reported }
}
