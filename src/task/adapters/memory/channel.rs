//! In-memory channel directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::ChannelId,
    ports::{Channel, ChannelDirectory, ChannelDirectoryError, ChannelDirectoryResult},
};

/// Thread-safe in-memory channel directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChannelDirectory {
    channels: Arc<RwLock<HashMap<ChannelId, Channel>>>,
}

impl InMemoryChannelDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelDirectoryError::Lookup`] when the lock is poisoned.
    pub fn upsert(&self, channel: Channel) -> ChannelDirectoryResult<()> {
        let mut channels = self.channels.write().map_err(|err| {
            ChannelDirectoryError::lookup(std::io::Error::other(err.to_string()))
        })?;
        channels.insert(channel.id, channel);
        Ok(())
    }
}

#[async_trait]
impl ChannelDirectory for InMemoryChannelDirectory {
    async fn get_channel(&self, id: ChannelId) -> ChannelDirectoryResult<Channel> {
        let channels = self.channels.read().map_err(|err| {
            ChannelDirectoryError::lookup(std::io::Error::other(err.to_string()))
        })?;
        channels
            .get(&id)
            .cloned()
            .ok_or(ChannelDirectoryError::NotFound(id))
    }
}
