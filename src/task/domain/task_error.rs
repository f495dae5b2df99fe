//! Caller-facing task errors with stable codes and HTTP-equivalent statuses.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Broad classification used to decide retry and surfacing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caused by the caller; never retried.
    Client,
    /// The upstream answered with a business error.
    Upstream,
    /// Transport or parse failure talking to the upstream.
    Transport,
    /// Missing adaptor, channel or other deployment setting.
    Configuration,
    /// Task store or ledger failure.
    Persistence,
}

/// Stable error codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    /// No adaptor is registered for the requested platform.
    InvalidApiPlatform,
    /// The inbound request has an invalid shape.
    InvalidRequest,
    /// The caller cannot afford the pre-charge.
    QuotaNotEnough,
    /// The caller's balance could not be read.
    GetUserQuotaFailed,
    /// The origin task of a continuation could not be read.
    GetOriginTaskFailed,
    /// The referenced task does not exist for the caller.
    TaskNotExist,
    /// The origin task's channel is unknown.
    ChannelNotFound,
    /// The origin task's channel is disabled.
    TaskChannelDisable,
    /// The outgoing request could not be built.
    BuildRequestFailed,
    /// The upstream call failed at the transport level.
    DoRequestFailed,
    /// The upstream answered with a non-success HTTP status.
    FailToFetchTask,
    /// The upstream body could not be read.
    ReadResponseBodyFailed,
    /// The upstream body could not be parsed.
    ParseResponseFailed,
    /// The upstream reported a business error code.
    UpstreamError,
    /// The upstream task id has an unexpected type.
    InvalidTaskId,
    /// The upstream response carries no task id.
    TaskIdNotFound,
    /// The upstream response carries no data object.
    ResponseDataNil,
    /// The new task could not be persisted.
    InsertTaskFailed,
    /// A single task lookup failed.
    GetTaskFailed,
    /// A batch task lookup failed.
    GetTasksFailed,
}

impl TaskErrorKind {
    /// Returns the stable wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidApiPlatform => "invalid_api_platform",
            Self::InvalidRequest => "invalid_request",
            Self::QuotaNotEnough => "quota_not_enough",
            Self::GetUserQuotaFailed => "get_user_quota_failed",
            Self::GetOriginTaskFailed => "get_origin_task_failed",
            Self::TaskNotExist => "task_not_exist",
            Self::ChannelNotFound => "channel_not_found",
            Self::TaskChannelDisable => "task_channel_disable",
            Self::BuildRequestFailed => "build_request_failed",
            Self::DoRequestFailed => "do_request_failed",
            Self::FailToFetchTask => "fail_to_fetch_task",
            Self::ReadResponseBodyFailed => "read_response_body_failed",
            Self::ParseResponseFailed => "parse_response_failed",
            Self::UpstreamError => "upstream_error",
            Self::InvalidTaskId => "invalid_task_id",
            Self::TaskIdNotFound => "task_id_not_found",
            Self::ResponseDataNil => "response_data_nil",
            Self::InsertTaskFailed => "insert_task_failed",
            Self::GetTaskFailed => "get_task_failed",
            Self::GetTasksFailed => "get_tasks_failed",
        }
    }

    /// Default HTTP-equivalent status for this code.
    #[must_use]
    pub const fn default_status(self) -> u16 {
        match self {
            Self::InvalidApiPlatform
            | Self::InvalidRequest
            | Self::TaskNotExist
            | Self::ChannelNotFound
            | Self::TaskChannelDisable
            | Self::UpstreamError => 400,
            Self::QuotaNotEnough => 403,
            Self::FailToFetchTask => 502,
            Self::GetUserQuotaFailed
            | Self::GetOriginTaskFailed
            | Self::BuildRequestFailed
            | Self::DoRequestFailed
            | Self::ReadResponseBodyFailed
            | Self::ParseResponseFailed
            | Self::InvalidTaskId
            | Self::TaskIdNotFound
            | Self::ResponseDataNil
            | Self::InsertTaskFailed
            | Self::GetTaskFailed
            | Self::GetTasksFailed => 500,
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::InvalidRequest
            | Self::QuotaNotEnough
            | Self::TaskNotExist
            | Self::TaskChannelDisable => ErrorCategory::Client,
            Self::InvalidApiPlatform | Self::ChannelNotFound => ErrorCategory::Configuration,
            Self::FailToFetchTask
            | Self::UpstreamError
            | Self::InvalidTaskId
            | Self::TaskIdNotFound
            | Self::ResponseDataNil => ErrorCategory::Upstream,
            Self::BuildRequestFailed
            | Self::DoRequestFailed
            | Self::ReadResponseBodyFailed
            | Self::ParseResponseFailed => ErrorCategory::Transport,
            Self::GetUserQuotaFailed
            | Self::GetOriginTaskFailed
            | Self::InsertTaskFailed
            | Self::GetTaskFailed
            | Self::GetTasksFailed => ErrorCategory::Persistence,
        }
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned synchronously by task submission and lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TaskError {
    kind: TaskErrorKind,
    message: String,
    status_code: u16,
    local: bool,
}

/// Serializable error body returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskErrorBody<'a> {
    /// Stable wire code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: &'a str,
}

impl TaskError {
    /// Creates an error raised by this gateway rather than the upstream.
    #[must_use]
    pub fn local(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: kind.default_status(),
            local: true,
        }
    }

    /// Wraps an underlying failure, typically from the upstream exchange.
    #[must_use]
    pub fn wrap(kind: TaskErrorKind, err: impl fmt::Display) -> Self {
        Self {
            kind,
            message: err.to_string(),
            status_code: kind.default_status(),
            local: false,
        }
    }

    /// Overrides the HTTP-equivalent status.
    #[must_use]
    pub const fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> TaskErrorKind {
        self.kind
    }

    /// Returns the stable wire code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP-equivalent status.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Returns `true` when the error originated in this gateway.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.local
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the body sent back to the caller.
    #[must_use]
    pub fn body(&self) -> TaskErrorBody<'_> {
        TaskErrorBody {
            code: self.code(),
            message: &self.message,
        }
    }
}
