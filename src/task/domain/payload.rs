//! Opaque upstream result payload stored on a task.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream result payload, replaced wholesale on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskPayload(Value);

impl TaskPayload {
    /// Wraps a structured payload.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Builds a payload from raw upstream bytes.
    ///
    /// Bodies that are not valid JSON are kept verbatim as a string value.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        serde_json::from_slice(bytes).map_or_else(
            |_| Self(Value::String(String::from_utf8_lossy(bytes).into_owned())),
            Self,
        )
    }

    /// Returns the structured payload.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the payload and returns the structured value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Returns `true` when no payload has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }

    /// Serialized bytes sorted into a canonical order.
    ///
    /// Two payloads whose serializations are permutations of one another share
    /// a fingerprint, so key or array reordering never reads as a change.
    #[must_use]
    pub fn fingerprint(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(&self.0).unwrap_or_default();
        bytes.sort_unstable();
        bytes
    }

    /// Returns `true` when both payloads carry the same content modulo ordering.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl From<Value> for TaskPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
