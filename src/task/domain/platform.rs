//! Upstream platform tags.

use super::ParsePlatformError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream platform a task was submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    /// Suno music and lyrics generation.
    #[serde(rename = "suno")]
    Suno,
    /// Midjourney. Reserved: no adaptor is registered for it.
    #[serde(rename = "mj")]
    Midjourney,
    /// Kling video generation.
    #[serde(rename = "kling")]
    Kling,
    /// Caller-defined pass-through upstream.
    #[serde(rename = "custompass")]
    CustomPass,
}

impl Platform {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Suno => "suno",
            Self::Midjourney => "mj",
            Self::Kling => "kling",
            Self::CustomPass => "custompass",
        }
    }
}

impl TryFrom<&str> for Platform {
    type Error = ParsePlatformError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "suno" => Ok(Self::Suno),
            "mj" | "midjourney" => Ok(Self::Midjourney),
            "kling" => Ok(Self::Kling),
            "custompass" => Ok(Self::CustomPass),
            _ => Err(ParsePlatformError(value.to_owned())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
