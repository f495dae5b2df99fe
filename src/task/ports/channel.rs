//! Channel directory port resolving upstream credentials.

use crate::task::domain::ChannelId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for channel directory lookups.
pub type ChannelDirectoryResult<T> = Result<T, ChannelDirectoryError>;

/// Whether a channel accepts traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    /// The channel is enabled.
    #[default]
    Enabled,
    /// An operator disabled the channel.
    ManuallyDisabled,
    /// The gateway disabled the channel after repeated failures.
    AutoDisabled,
}

impl ChannelStatus {
    /// Returns `true` when the channel accepts traffic.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Upstream endpoint and credentials of one backend channel.
#[derive(Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel identifier.
    pub id: ChannelId,
    /// Base URL of the upstream API, without a trailing slash.
    pub base_url: String,
    /// Upstream API key.
    pub key: String,
    /// Traffic status.
    pub status: ChannelStatus,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("key", &"<redacted>")
            .field("status", &self.status)
            .finish()
    }
}

/// Channel lookup contract.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Resolves a channel by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelDirectoryError::NotFound`] for unknown channels.
    async fn get_channel(&self, id: ChannelId) -> ChannelDirectoryResult<Channel>;
}

/// Errors returned by channel directory implementations.
#[derive(Debug, Clone, Error)]
pub enum ChannelDirectoryError {
    /// No channel has the identifier.
    #[error("channel not found: {0}")]
    NotFound(ChannelId),

    /// The directory could not be read.
    #[error("channel lookup failed: {0}")]
    Lookup(Arc<dyn std::error::Error + Send + Sync>),
}

impl ChannelDirectoryError {
    /// Wraps a lookup error.
    pub fn lookup(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Lookup(Arc::new(err))
    }
}
