//! Error types for task domain validation and parsing.

use super::ExternalTaskId;
use thiserror::Error;

/// Errors returned while mutating domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task is terminal and must not be re-processed.
    #[error("task {0} is already finished")]
    AlreadyFinished(ExternalTaskId),
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

/// Error returned while parsing a task platform tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task platform: {0}")]
pub struct ParsePlatformError(pub String);
