//! Suno music and lyrics adaptor.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::adaptor::{
    ClientReply, FetchQuery, InboundRequest, RelayContext, SubmitOutcome, TaskAdaptor,
    build_failed, parse_submit_body,
};
use super::http::{FetchError, UpstreamClient, UpstreamRequest, UpstreamResponse, json_headers};
use crate::task::domain::{
    ExternalTaskId, Platform, Task, TaskError, TaskErrorKind, TaskPayload, TaskStatus,
    UpstreamTaskRecord,
};

/// Action generating a song.
pub const ACTION_MUSIC: &str = "MUSIC";
/// Action generating lyrics only.
pub const ACTION_LYRICS: &str = "LYRICS";

const SUCCESS_CODE: &str = "success";
const DEFAULT_MODEL_VERSION: &str = "chirp-v3-0";

/// Submission body accepted from callers and forwarded upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SunoSubmitRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    prompt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    mv: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    continue_at: Option<f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    continue_clip_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    gpt_description_prompt: String,
    #[serde(default)]
    make_instrumental: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct SunoEnvelope<T> {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SunoTaskItem {
    task_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    progress: String,
    #[serde(default)]
    fail_reason: String,
    #[serde(default)]
    submit_time: i64,
    #[serde(default)]
    start_time: i64,
    #[serde(default)]
    finish_time: i64,
    #[serde(default)]
    data: Value,
}

/// Adaptor for the Suno task API.
#[derive(Debug, Clone, Copy, Default)]
pub struct SunoAdaptor;

impl SunoAdaptor {
    /// Creates the adaptor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn invalid(message: impl Into<String>) -> TaskError {
    TaskError::local(TaskErrorKind::InvalidRequest, message)
}

fn to_record(item: SunoTaskItem) -> UpstreamTaskRecord {
    let mut record = UpstreamTaskRecord::new(ExternalTaskId::new(item.task_id));
    let reported = TaskStatus::try_from(item.status.as_str()).ok();
    record.status = if item.fail_reason.trim().is_empty() {
        reported
    } else {
        Some(TaskStatus::Failure)
    };
    record.progress = Some(item.progress);
    record.fail_reason = Some(item.fail_reason);
    record.submit_time = item.submit_time;
    record.start_time = item.start_time;
    record.finish_time = item.finish_time;
    record.data = (!item.data.is_null()).then(|| TaskPayload::new(item.data));
    record
}

#[async_trait]
impl TaskAdaptor for SunoAdaptor {
    fn platform(&self) -> Platform {
        Platform::Suno
    }

    fn validate_request_and_set_action(
        &self,
        context: &mut RelayContext,
        request: &InboundRequest,
    ) -> Result<(), TaskError> {
        let action = context.action.trim().to_uppercase();
        if action != ACTION_MUSIC && action != ACTION_LYRICS {
            return Err(invalid(format!("invalid suno action: {}", context.action)));
        }
        let mut body: SunoSubmitRequest = request.json()?;
        if action == ACTION_LYRICS {
            if body.prompt.trim().is_empty() {
                return Err(invalid("prompt is required for lyrics"));
            }
        } else {
            if body.prompt.trim().is_empty() && body.gpt_description_prompt.trim().is_empty() {
                return Err(invalid("prompt or gpt_description_prompt is required"));
            }
            if body.mv.is_empty() {
                DEFAULT_MODEL_VERSION.clone_into(&mut body.mv);
            }
        }
        if !body.task_id.trim().is_empty() {
            context.origin_task_id = Some(ExternalTaskId::new(body.task_id.as_str()));
        }
        context.payload = Some(serde_json::to_value(&body).map_err(build_failed)?);
        context.action = action;
        Ok(())
    }

    fn pricing_model(&self, context: &RelayContext) -> String {
        format!("{}_{}", Platform::Suno.as_str(), context.action).to_lowercase()
    }

    fn build_request_url(&self, context: &RelayContext) -> Result<String, TaskError> {
        Ok(format!(
            "{}/suno/submit/{}",
            context.base_url,
            context.action.to_lowercase()
        ))
    }

    fn build_request_header(&self, context: &RelayContext) -> Result<HeaderMap, TaskError> {
        json_headers(&context.api_key).map_err(build_failed)
    }

    fn do_response(
        &self,
        _context: &RelayContext,
        response: &UpstreamResponse,
    ) -> Result<SubmitOutcome, TaskError> {
        let envelope: SunoEnvelope<String> = parse_submit_body(&response.body)?;
        if envelope.code != SUCCESS_CODE {
            return Err(TaskError::wrap(
                TaskErrorKind::UpstreamError,
                format!("{}: {}", envelope.code, envelope.message),
            ));
        }
        let task_id = envelope
            .data
            .map(ExternalTaskId::new)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                TaskError::wrap(TaskErrorKind::TaskIdNotFound, "task id missing in response")
            })?;
        let reply = json!({ "code": SUCCESS_CODE, "message": "", "data": task_id.as_str() });
        Ok(SubmitOutcome {
            task_id,
            data: TaskPayload::from_bytes(&response.body),
            usage: None,
            client_body: ClientReply::json(&reply),
        })
    }

    fn plan_fetch(&self, tasks: &[Task]) -> Vec<FetchQuery> {
        let task_ids: Vec<ExternalTaskId> = tasks
            .iter()
            .map(|task| task.external_id().clone())
            .filter(|id| !id.is_empty())
            .collect();
        if task_ids.is_empty() {
            return Vec::new();
        }
        vec![FetchQuery {
            task_ids,
            route: String::new(),
            client_token: None,
        }]
    }

    async fn fetch_task(
        &self,
        client: &UpstreamClient,
        base_url: &str,
        key: &str,
        query: &FetchQuery,
    ) -> Result<Vec<u8>, FetchError> {
        let ids: Vec<&str> = query.task_ids.iter().map(ExternalTaskId::as_str).collect();
        let body = serde_json::to_vec(&json!({ "ids": ids }))
            .map_err(|err| FetchError::decode(&err, &[]))?;
        client
            .fetch(UpstreamRequest {
                method: Method::POST,
                url: format!("{}/suno/fetch", base_url.trim_end_matches('/')),
                headers: json_headers(key)?,
                body: Some(body),
            })
            .await
    }

    fn parse_fetch_response(
        &self,
        _query: &FetchQuery,
        body: &[u8],
    ) -> Result<Vec<UpstreamTaskRecord>, FetchError> {
        let envelope: SunoEnvelope<Vec<SunoTaskItem>> =
            serde_json::from_slice(body).map_err(|err| FetchError::decode(&err, body))?;
        if envelope.code != SUCCESS_CODE {
            return Err(FetchError::upstream(format!(
                "{}: {}",
                envelope.code, envelope.message
            )));
        }
        Ok(envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .map(to_record)
            .collect())
    }
}
