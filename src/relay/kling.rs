//! Kling video generation adaptor.
//!
//! Submissions choose `text2video` or `image2video` from the presence of an
//! image. Status queries are issued per task against the same kind.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::adaptor::{
    ClientReply, FetchQuery, InboundRequest, RelayContext, SubmitOutcome, TaskAdaptor,
    build_failed, parse_submit_body,
};
use super::http::{FetchError, UpstreamClient, UpstreamRequest, UpstreamResponse, json_headers};
use crate::task::domain::{
    ExternalTaskId, Platform, Task, TaskError, TaskErrorKind, TaskPayload, TaskStatus,
    UpstreamTaskRecord,
};

/// Action for prompt-only generation.
pub const ACTION_TEXT_GENERATE: &str = "textGenerate";
/// Action for image-conditioned generation.
pub const ACTION_GENERATE: &str = "generate";

const KIND_TEXT: &str = "text2video";
const KIND_IMAGE: &str = "image2video";
const DEFAULT_MODEL: &str = "kling-v1";
const MILLIS_PER_SECOND: i64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct KlingSubmitRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    prompt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    negative_prompt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    image: String,
    #[serde(default, alias = "model", skip_serializing_if = "String::is_empty")]
    model_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    aspect_ratio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cfg_scale: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct KlingEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<KlingTaskData>,
}

#[derive(Debug, Deserialize)]
struct KlingTaskData {
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    task_status: String,
    #[serde(default)]
    task_status_msg: String,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
}

/// Adaptor for the Kling video API.
#[derive(Debug, Clone, Copy, Default)]
pub struct KlingAdaptor;

impl KlingAdaptor {
    /// Creates the adaptor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Maps a Kling task status to the internal vocabulary.
#[must_use]
pub fn map_status(status: &str) -> TaskStatus {
    match status {
        "submitted" => TaskStatus::Submitted,
        "processing" => TaskStatus::InProgress,
        "succeed" => TaskStatus::Success,
        "failed" => TaskStatus::Failure,
        _ => TaskStatus::Unknown,
    }
}

fn kind_for_action(action: &str) -> &'static str {
    if action == ACTION_GENERATE {
        KIND_IMAGE
    } else {
        KIND_TEXT
    }
}

const fn millis_to_seconds(millis: i64) -> i64 {
    millis.div_euclid(MILLIS_PER_SECOND)
}

fn to_record(data: KlingTaskData, raw: Value) -> UpstreamTaskRecord {
    let status = map_status(&data.task_status);
    let mut record = UpstreamTaskRecord::new(ExternalTaskId::new(data.task_id));
    record.status = Some(status);
    record.submit_time = millis_to_seconds(data.created_at);
    if status.is_terminal() {
        record.finish_time = millis_to_seconds(data.updated_at);
    }
    if status == TaskStatus::Failure {
        record.fail_reason = Some(data.task_status_msg);
    }
    record.data = Some(TaskPayload::new(raw));
    record
}

#[async_trait]
impl TaskAdaptor for KlingAdaptor {
    fn platform(&self) -> Platform {
        Platform::Kling
    }

    fn validate_request_and_set_action(
        &self,
        context: &mut RelayContext,
        request: &InboundRequest,
    ) -> Result<(), TaskError> {
        let mut body: KlingSubmitRequest = request.json()?;
        let has_image = !body.image.trim().is_empty();
        if !has_image && body.prompt.trim().is_empty() {
            return Err(TaskError::local(
                TaskErrorKind::InvalidRequest,
                "prompt is required",
            ));
        }
        if context.origin_model_name.is_empty() {
            context.origin_model_name = if body.model_name.is_empty() {
                DEFAULT_MODEL.to_owned()
            } else {
                body.model_name.clone()
            };
        }
        context.origin_model_name.clone_into(&mut body.model_name);
        context.action = if has_image {
            ACTION_GENERATE
        } else {
            ACTION_TEXT_GENERATE
        }
        .to_owned();
        context.payload = Some(serde_json::to_value(&body).map_err(build_failed)?);
        Ok(())
    }

    fn build_request_url(&self, context: &RelayContext) -> Result<String, TaskError> {
        Ok(format!(
            "{}/v1/videos/{}",
            context.base_url,
            kind_for_action(&context.action)
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
        let envelope: KlingEnvelope = parse_submit_body(&response.body)?;
        if envelope.code != 0 {
            return Err(TaskError::wrap(
                TaskErrorKind::UpstreamError,
                format!("{}: {}", envelope.code, envelope.message),
            ));
        }
        let data = envelope.data.ok_or_else(|| {
            TaskError::wrap(TaskErrorKind::ResponseDataNil, "response data is nil")
        })?;
        let task_id = ExternalTaskId::new(data.task_id);
        if task_id.is_empty() {
            return Err(TaskError::wrap(
                TaskErrorKind::TaskIdNotFound,
                "task_id not found in response",
            ));
        }
        Ok(SubmitOutcome {
            task_id,
            data: TaskPayload::from_bytes(&response.body),
            usage: None,
            client_body: ClientReply::passthrough(response),
        })
    }

    fn plan_fetch(&self, tasks: &[Task]) -> Vec<FetchQuery> {
        tasks
            .iter()
            .filter(|task| !task.external_id().is_empty())
            .map(|task| FetchQuery {
                task_ids: vec![task.external_id().clone()],
                route: kind_for_action(task.action()).to_owned(),
                client_token: None,
            })
            .collect()
    }

    async fn fetch_task(
        &self,
        client: &UpstreamClient,
        base_url: &str,
        key: &str,
        query: &FetchQuery,
    ) -> Result<Vec<u8>, FetchError> {
        let task_id = query
            .task_ids
            .first()
            .ok_or_else(|| FetchError::upstream("kling status query without a task id"))?;
        client
            .fetch(UpstreamRequest {
                method: Method::GET,
                url: format!(
                    "{}/v1/videos/{}/{}",
                    base_url.trim_end_matches('/'),
                    query.route,
                    task_id
                ),
                headers: json_headers(key)?,
                body: None,
            })
            .await
    }

    fn parse_fetch_response(
        &self,
        _query: &FetchQuery,
        body: &[u8],
    ) -> Result<Vec<UpstreamTaskRecord>, FetchError> {
        let raw: Value =
            serde_json::from_slice(body).map_err(|err| FetchError::decode(&err, body))?;
        let envelope: KlingEnvelope =
            serde_json::from_value(raw.clone()).map_err(|err| FetchError::decode(&err, body))?;
        if envelope.code != 0 {
            return Err(FetchError::upstream(format!(
                "{}: {}",
                envelope.code, envelope.message
            )));
        }
        let data_value = raw.get("data").cloned().unwrap_or(Value::Null);
        Ok(envelope
            .data
            .map(|data| to_record(data, data_value))
            .into_iter()
            .collect())
    }
}
