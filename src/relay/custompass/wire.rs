//! Wire shapes of the pass-through protocol and their normalization.

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::relay::adaptor::Usage;
use crate::relay::http::FetchError;
use crate::task::domain::{ExternalTaskId, TaskPayload, TaskStatus, UpstreamTaskRecord};

/// Suffix every task-submitting model name carries.
pub const SUBMIT_SUFFIX: &str = "/submit";

/// Outer envelope of every pass-through response.
///
/// `data` is kept raw so the caller can decode it once `code` is known.
#[derive(Debug, Deserialize)]
pub struct UpstreamEnvelope {
    /// Business status; zero means success.
    #[serde(default)]
    pub code: i64,
    /// Business message.
    #[serde(default)]
    pub msg: String,
    /// Undecoded payload.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

/// Submission response.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Business status; zero means success.
    #[serde(default)]
    pub code: i64,
    /// Business message.
    #[serde(default)]
    pub msg: String,
    /// Payload holding `task_id`.
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    /// Token usage, when reported.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One task in a status query response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskInfo {
    /// Upstream identifier.
    pub task_id: String,
    /// Upstream status word.
    #[serde(default)]
    pub status: String,
    /// Upstream progress string.
    #[serde(default)]
    pub progress: String,
    /// Result items.
    #[serde(default)]
    pub result: Vec<Map<String, Value>>,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
}

/// Maps a pass-through status word to the internal vocabulary.
#[must_use]
pub fn map_status(status: &str) -> TaskStatus {
    match status {
        "completed" => TaskStatus::Success,
        "error" | "failed" => TaskStatus::Failure,
        "pending" | "pendding" | "processing" => TaskStatus::InProgress,
        _ => TaskStatus::Unknown,
    }
}

/// Returns the failure description of a task report.
///
/// The `error` field wins; failed tasks without one fall back to the first
/// non-empty `result[*].error`.
#[must_use]
pub fn fail_reason(info: &TaskInfo, status: TaskStatus) -> Option<String> {
    if let Some(error) = &info.error {
        return Some(error.clone());
    }
    if status != TaskStatus::Failure {
        return None;
    }
    info.result
        .iter()
        .filter_map(|item| item.get("error").and_then(Value::as_str))
        .find(|error| !error.is_empty())
        .map(str::to_owned)
}

/// Returns `true` when a response belongs to a task submission.
///
/// Submissions are recognised by an action containing `submit`, or by a
/// `task_id` at the top level or inside `data`.
#[must_use]
pub fn is_submission(action: &str, body: &[u8]) -> bool {
    if action.to_lowercase().contains("submit") {
        return true;
    }
    let Ok(Value::Object(root)) = serde_json::from_slice::<Value>(body) else {
        return false;
    };
    root.contains_key("task_id")
        || root
            .get("data")
            .and_then(Value::as_object)
            .is_some_and(|data| data.contains_key("task_id"))
}

/// Converts query parameters into a JSON object.
///
/// Repeated keys become arrays; single keys stay strings.
#[must_use]
pub fn query_to_json(query: &[(String, String)]) -> Value {
    let mut grouped: Map<String, Value> = Map::new();
    for (key, value) in query {
        let next = match grouped.remove(key) {
            None => Value::String(value.clone()),
            Some(Value::Array(mut values)) => {
                values.push(Value::String(value.clone()));
                Value::Array(values)
            }
            Some(existing) => Value::Array(vec![existing, Value::String(value.clone())]),
        };
        grouped.insert(key.clone(), next);
    }
    Value::Object(grouped)
}

/// Returns the model path used for status queries.
#[must_use]
pub fn query_model(model: &str) -> &str {
    model.strip_suffix(SUBMIT_SUFFIX).unwrap_or(model)
}

/// Extracts usage from a synchronous pass-through response.
///
/// Usage is only reported when `total_tokens` is positive.
#[must_use]
pub fn extract_usage(body: &[u8]) -> Option<Usage> {
    let root: Value = serde_json::from_slice(body).ok()?;
    let usage: Usage = serde_json::from_value(root.get("usage")?.clone()).ok()?;
    (usage.total_tokens > 0).then_some(usage)
}

/// Decodes a status query response in two phases: envelope, then records.
///
/// # Errors
///
/// Returns a decode error for malformed bodies and an upstream error when
/// `code` is non-zero.
pub fn parse_task_list(body: &[u8]) -> Result<Vec<UpstreamTaskRecord>, FetchError> {
    let envelope: UpstreamEnvelope =
        serde_json::from_slice(body).map_err(|err| FetchError::decode(&err, body))?;
    if envelope.code != 0 {
        return Err(FetchError::upstream(format!(
            "code {}: {}",
            envelope.code, envelope.msg
        )));
    }
    let Some(raw) = envelope.data else {
        return Ok(Vec::new());
    };
    let items: Vec<TaskInfo> = serde_json::from_str(raw.get())
        .map_err(|err| FetchError::decode(&err, raw.get().as_bytes()))?;
    Ok(items.into_iter().map(to_record).collect())
}

fn to_record(info: TaskInfo) -> UpstreamTaskRecord {
    let status = map_status(&info.status);
    let mut record = UpstreamTaskRecord::new(ExternalTaskId::new(info.task_id.as_str()));
    record.status = Some(status);
    record.fail_reason = fail_reason(&info, status);
    let TaskInfo {
        progress, result, ..
    } = info;
    record.progress = Some(progress);
    if !result.is_empty() {
        let items = result.into_iter().map(Value::Object).collect();
        record.data = Some(TaskPayload::new(Value::Array(items)));
    }
    record
}
