//! Platform-to-adaptor lookup, populated once at start-up.

use std::collections::HashMap;
use std::sync::Arc;

use super::adaptor::TaskAdaptor;
use super::custompass::CustomPassAdaptor;
use super::kling::KlingAdaptor;
use super::suno::SunoAdaptor;
use crate::task::domain::Platform;

/// Registry of task adaptors keyed by platform.
#[derive(Clone, Default)]
pub struct AdaptorRegistry {
    adaptors: HashMap<Platform, Arc<dyn TaskAdaptor>>,
}

impl AdaptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the Suno, Kling and pass-through adaptors.
    #[must_use]
    pub fn with_defaults(custom_pass_header_key: Option<String>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SunoAdaptor::new()));
        registry.register(Arc::new(KlingAdaptor::new()));
        registry.register(Arc::new(CustomPassAdaptor::new(custom_pass_header_key)));
        registry
    }

    /// Registers `adaptor` under its own platform, replacing any previous one.
    pub fn register(&mut self, adaptor: Arc<dyn TaskAdaptor>) {
        self.adaptors.insert(adaptor.platform(), adaptor);
    }

    /// Returns the adaptor for `platform`.
    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn TaskAdaptor>> {
        self.adaptors.get(&platform).cloned()
    }

    /// Returns `true` when an adaptor serves `platform`.
    #[must_use]
    pub fn contains(&self, platform: Platform) -> bool {
        self.adaptors.contains_key(&platform)
    }
}

impl std::fmt::Debug for AdaptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut platforms: Vec<&str> = self.adaptors.keys().map(|p| p.as_str()).collect();
        platforms.sort_unstable();
        f.debug_struct("AdaptorRegistry")
            .field("platforms", &platforms)
            .finish()
    }
}
