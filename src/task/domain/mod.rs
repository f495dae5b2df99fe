//! Domain model for asynchronous relay tasks.
//!
//! The task domain models the lifecycle of a long-running upstream job: its
//! identity, its forward-only status machine, and the rules for merging an
//! upstream status report into local state. Infrastructure concerns stay
//! outside the domain boundary.

mod error;
mod ids;
mod payload;
mod platform;
mod status;
mod task;
mod task_error;

pub use error::{ParsePlatformError, ParseTaskStatusError, TaskDomainError};
pub use ids::{ChannelId, ExternalTaskId, TaskRecordId, TokenId, UserId};
pub use payload::TaskPayload;
pub use platform::Platform;
pub use status::{PROGRESS_COMPLETE, PROGRESS_INITIAL, TaskStatus};
pub use task::{
    NewTask, PersistedTaskData, Task, TaskProperties, TaskUpdateOutcome, UpstreamTaskRecord,
};
pub use task_error::{ErrorCategory, TaskError, TaskErrorBody, TaskErrorKind};
