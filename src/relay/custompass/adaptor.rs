//! Task adaptor for pass-through upstreams.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value, json};

use super::wire::{self, SUBMIT_SUFFIX, SubmitResponse};
use crate::relay::adaptor::{
    ClientReply, FetchQuery, InboundRequest, RelayContext, SubmitOutcome, TaskAdaptor,
    build_failed, parse_submit_body,
};
use crate::relay::http::{
    FetchError, UpstreamClient, UpstreamRequest, UpstreamResponse, fingerprint, insert_header,
    json_headers,
};
use crate::task::domain::{
    ExternalTaskId, Platform, Task, TaskError, TaskErrorKind, TaskPayload, UpstreamTaskRecord,
};

/// Action recorded for every pass-through submission.
pub const ACTION_SUBMIT: &str = "submit";

/// Adaptor for caller-defined pass-through upstreams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomPassAdaptor {
    header_key: Option<String>,
}

impl CustomPassAdaptor {
    /// Creates the adaptor.
    ///
    /// When `header_key` is set, the caller's token key is forwarded under
    /// that header name.
    #[must_use]
    pub fn new(header_key: Option<String>) -> Self {
        Self {
            header_key: header_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// Returns the correlation header name, if configured.
    #[must_use]
    pub fn header_key(&self) -> Option<&str> {
        self.header_key.as_deref()
    }

    /// Builds bearer headers plus the correlation header when both the header
    /// name and the client token are non-empty.
    ///
    /// # Errors
    ///
    /// Returns a request error for unrepresentable header values.
    pub fn upstream_headers(
        &self,
        api_key: &str,
        client_token: Option<&str>,
    ) -> Result<HeaderMap, FetchError> {
        let mut headers = json_headers(api_key)?;
        let correlation = self
            .header_key
            .as_deref()
            .zip(client_token.filter(|token| !token.is_empty()));
        if let Some((name, token)) = correlation {
            insert_header(&mut headers, name, token)?;
            tracing::debug!(
                target: "taskrelay::adaptor",
                stage = "custompass.correlation",
                header = name,
                client = %fingerprint(token)
            );
        }
        Ok(headers)
    }

    /// Builds the URL of a synchronous call or submission to `model`.
    ///
    /// # Errors
    ///
    /// Returns `build_request_failed` when the base URL or model is empty.
    pub fn model_url(base_url: &str, model: &str) -> Result<String, TaskError> {
        if base_url.is_empty() {
            return Err(build_failed("base_url is required for custom pass channels"));
        }
        if model.is_empty() {
            return Err(build_failed("model name is required"));
        }
        Ok(format!("{}/{model}", base_url.trim_end_matches('/')))
    }

    fn submission_outcome(response: &UpstreamResponse) -> Result<SubmitOutcome, TaskError> {
        let parsed: SubmitResponse = parse_submit_body(&response.body)?;
        if parsed.code != 0 {
            return Err(TaskError::wrap(TaskErrorKind::UpstreamError, parsed.msg));
        }
        let data = parsed.data.ok_or_else(|| {
            TaskError::wrap(TaskErrorKind::ResponseDataNil, "response data is nil")
        })?;
        let task_id = match data.get("task_id") {
            Some(Value::String(id)) => ExternalTaskId::new(id.as_str()),
            Some(_) => {
                return Err(TaskError::wrap(
                    TaskErrorKind::InvalidTaskId,
                    "invalid task_id format",
                ));
            }
            None => {
                return Err(TaskError::wrap(
                    TaskErrorKind::TaskIdNotFound,
                    "task_id not found in response",
                ));
            }
        };
        match parsed.usage {
            Some(usage) => tracing::info!(
                target: "taskrelay::adaptor",
                task_id = %task_id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "custom pass submission reported usage"
            ),
            None => tracing::info!(
                target: "taskrelay::adaptor",
                task_id = %task_id,
                "custom pass submission without usage; per-call or free billing applies"
            ),
        }
        let reply = json!({ "task_id": task_id.as_str() });
        Ok(SubmitOutcome {
            task_id,
            data: TaskPayload::from_bytes(&response.body),
            usage: parsed.usage,
            client_body: ClientReply::json(&reply),
        })
    }
}

#[async_trait]
impl TaskAdaptor for CustomPassAdaptor {
    fn platform(&self) -> Platform {
        Platform::CustomPass
    }

    fn validate_request_and_set_action(
        &self,
        context: &mut RelayContext,
        request: &InboundRequest,
    ) -> Result<(), TaskError> {
        let model = context.origin_model_name.as_str();
        if model.is_empty() {
            return Err(TaskError::local(
                TaskErrorKind::InvalidRequest,
                "model is required",
            ));
        }
        if !model.ends_with(SUBMIT_SUFFIX) {
            return Err(TaskError::local(
                TaskErrorKind::InvalidRequest,
                format!("invalid submit model: {model}"),
            ));
        }
        context.action = ACTION_SUBMIT.to_owned();
        context.method = request.method.clone();
        let payload = if request.method == Method::GET {
            wire::query_to_json(&request.query)
        } else {
            Value::Object(request.json::<Map<String, Value>>()?)
        };
        context.payload = Some(payload);
        Ok(())
    }

    fn request_method(&self, context: &RelayContext) -> Method {
        context.method.clone()
    }

    fn build_request_url(&self, context: &RelayContext) -> Result<String, TaskError> {
        Self::model_url(&context.base_url, &context.origin_model_name)
    }

    fn build_request_header(&self, context: &RelayContext) -> Result<HeaderMap, TaskError> {
        self.upstream_headers(&context.api_key, Some(context.token_key.as_str()))
            .map_err(build_failed)
    }

    fn build_request_body(&self, context: &RelayContext) -> Result<Option<Vec<u8>>, TaskError> {
        if context.method == Method::GET {
            return Ok(None);
        }
        let payload = context
            .payload
            .as_ref()
            .ok_or_else(|| build_failed("request payload not validated"))?;
        serde_json::to_vec(payload).map(Some).map_err(build_failed)
    }

    fn do_response(
        &self,
        context: &RelayContext,
        response: &UpstreamResponse,
    ) -> Result<SubmitOutcome, TaskError> {
        if wire::is_submission(&context.action, &response.body) {
            return Self::submission_outcome(response);
        }
        Ok(SubmitOutcome {
            task_id: ExternalTaskId::default(),
            data: TaskPayload::from_bytes(&response.body),
            usage: None,
            client_body: ClientReply::passthrough(response),
        })
    }

    fn plan_fetch(&self, tasks: &[Task]) -> Vec<FetchQuery> {
        let mut queries: Vec<FetchQuery> = Vec::new();
        for task in tasks {
            let model = task.properties().model.as_str();
            if model.is_empty() || task.external_id().is_empty() {
                continue;
            }
            let token = Some(task.token_key())
                .filter(|key| !key.is_empty())
                .map(str::to_owned);
            if let Some(query) = queries.iter_mut().find(|query| query.route == model) {
                query.task_ids.push(task.external_id().clone());
                if query.client_token.is_none() {
                    query.client_token = token;
                }
            } else {
                queries.push(FetchQuery {
                    task_ids: vec![task.external_id().clone()],
                    route: model.to_owned(),
                    client_token: token,
                });
            }
        }
        queries
    }

    async fn fetch_task(
        &self,
        client: &UpstreamClient,
        base_url: &str,
        key: &str,
        query: &FetchQuery,
    ) -> Result<Vec<u8>, FetchError> {
        let model = wire::query_model(&query.route);
        let url = Self::model_url(base_url, model)
            .map(|prefix| format!("{prefix}/task/list-by-condition"))
            .map_err(|err| FetchError::upstream(err.message()))?;
        let ids: Vec<&str> = query.task_ids.iter().map(ExternalTaskId::as_str).collect();
        let body = serde_json::to_vec(&json!({ "task_ids": ids }))
            .map_err(|err| FetchError::decode(&err, &[]))?;
        tracing::debug!(
            target: "taskrelay::adaptor",
            stage = "custompass.fetch",
            url = %url,
            tasks = ids.len()
        );
        client
            .fetch(UpstreamRequest {
                method: Method::POST,
                url,
                headers: self.upstream_headers(key, query.client_token.as_deref())?,
                body: Some(body),
            })
            .await
    }

    fn parse_fetch_response(
        &self,
        _query: &FetchQuery,
        body: &[u8],
    ) -> Result<Vec<UpstreamTaskRecord>, FetchError> {
        wire::parse_task_list(body)
    }
}
