//! Task lifecycle status and progress values.

use super::ParseTaskStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress value carried by every terminal task.
pub const PROGRESS_COMPLETE: &str = "100%";

/// Progress value of a freshly submitted task.
pub const PROGRESS_INITIAL: &str = "0%";

/// Task lifecycle status, normalized from every upstream vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// The upstream reported something outside the known vocabulary.
    Unknown,
    /// Accepted locally, upstream work not started.
    NotStart,
    /// Submitted to the upstream.
    Submitted,
    /// Waiting in the upstream queue.
    Queued,
    /// Upstream is working on the task.
    InProgress,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failure,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotStart => "NOT_START",
            Self::Submitted => "SUBMITTED",
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Returns `true` for success and failure.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Position along the forward-only lifecycle.
    ///
    /// `Unknown` carries no ordering information and ranks lowest.
    const fn rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::NotStart => 1,
            Self::Submitted => 2,
            Self::Queued => 3,
            Self::InProgress => 4,
            Self::Success | Self::Failure => 5,
        }
    }

    /// Returns whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Statuses only move forward, terminal statuses never change, and an
    /// `Unknown` report never replaces a known status.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Self::Unknown) {
            return matches!(self, Self::Unknown);
        }
        next.rank() >= self.rank()
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "UNKNOWN" => Ok(Self::Unknown),
            "NOT_START" => Ok(Self::NotStart),
            "SUBMITTED" => Ok(Self::Submitted),
            "QUEUED" => Ok(Self::Queued),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
