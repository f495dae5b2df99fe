//! Relay configuration loaded from TOML with environment overrides.
//!
//! ```toml
//! poll_interval_secs = 15
//! batch_size = 500
//! custom_pass_header_key = "X-Client-Token"
//!
//! [pricing.model_prices]
//! "alpha/submit" = 0.2
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::billing::{DEFAULT_FALLBACK_MODEL_PRICE, DEFAULT_QUOTA_PER_UNIT, QuotaPolicy};
use crate::task::adapters::memory::PricingTable;

/// Overrides the pass-through correlation header name.
pub const ENV_CUSTOM_PASS_HEADER_KEY: &str = "CUSTOM_PASS_HEADER_KEY";
/// Overrides the polling interval in seconds.
pub const ENV_POLL_INTERVAL_SECS: &str = "TASK_POLL_INTERVAL_SECS";
/// Overrides the polling batch size.
pub const ENV_BATCH_SIZE: &str = "TASK_BATCH_SIZE";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration is not valid TOML for [`RelayConfig`].
    #[error("invalid config: {0}")]
    Parse(#[source] Box<toml::de::Error>),
    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
    /// A setting is outside its accepted range.
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting {
        /// Setting name.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Settings of the task relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Seconds between reconciliation cycles.
    pub poll_interval_secs: u64,
    /// Maximum unfinished tasks loaded per cycle.
    pub batch_size: usize,
    /// Deadline of one status query, in seconds.
    pub fetch_timeout_secs: u64,
    /// Deadline of one submission, in seconds.
    pub submit_timeout_secs: u64,
    /// Quota units per currency unit.
    pub quota_per_unit: i64,
    /// Price of models without configured or default prices.
    pub fallback_model_price: f64,
    /// Header carrying the caller's token key to pass-through upstreams.
    pub custom_pass_header_key: Option<String>,
    /// Default page size of task listings.
    pub items_per_page: i64,
    /// Prices and ratios.
    pub pricing: PricingTable,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            batch_size: 500,
            fetch_timeout_secs: 15,
            submit_timeout_secs: 60,
            quota_per_unit: DEFAULT_QUOTA_PER_UNIT,
            fallback_model_price: DEFAULT_FALLBACK_MODEL_PRICE,
            custom_pass_header_key: None,
            items_per_page: 10,
            pricing: PricingTable::default(),
        }
    }
}

impl RelayConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::InvalidSetting`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|err| ConfigError::Parse(Box::new(err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// as [`RelayConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = path.as_ref();
        let source = std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
            path: file.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`; blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let read = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(header) = read(ENV_CUSTOM_PASS_HEADER_KEY) {
            self.custom_pass_header_key = Some(header.trim().to_owned());
        }
        if let Some(raw) = read(ENV_POLL_INTERVAL_SECS) {
            self.poll_interval_secs = parse_env(ENV_POLL_INTERVAL_SECS, &raw)?;
        }
        if let Some(raw) = read(ENV_BATCH_SIZE) {
            self.batch_size = parse_env(ENV_BATCH_SIZE, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "poll_interval_secs",
                reason: "must be positive",
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "batch_size",
                reason: "must be positive",
            });
        }
        if self.quota_per_unit <= 0 {
            return Err(ConfigError::InvalidSetting {
                name: "quota_per_unit",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Returns the polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the status query deadline.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Returns the submission deadline.
    #[must_use]
    pub const fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    /// Returns the quota arithmetic constants.
    #[must_use]
    pub const fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            quota_per_unit: self.quota_per_unit,
            fallback_model_price: self.fallback_model_price,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: raw.to_owned(),
    })
}
