//! Platform adaptor contract and the values exchanged through it.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http::{FetchError, UpstreamClient, UpstreamRequest, UpstreamResponse};
use crate::task::domain::{
    ChannelId, ExternalTaskId, Platform, Task, TaskError, TaskErrorKind, TaskPayload, TokenId,
    UpstreamTaskRecord, UserId,
};

/// Per-request routing facts, filled by the caller and refined by adaptors.
#[derive(Clone, PartialEq)]
pub struct RelayContext {
    /// Target platform.
    pub platform: Platform,
    /// Calling user.
    pub user_id: UserId,
    /// Pricing group of the call.
    pub group: String,
    /// Group the user belongs to, used for group-group overrides.
    pub user_group: String,
    /// Channel selected for the call.
    pub channel_id: ChannelId,
    /// Calling token.
    pub token_id: TokenId,
    /// Calling token key.
    pub token_key: String,
    /// Calling token display name.
    pub token_name: String,
    /// Upstream base URL of the selected channel.
    pub base_url: String,
    /// Upstream API key of the selected channel.
    pub api_key: String,
    /// Model named by the caller, such as `alpha/submit`.
    pub origin_model_name: String,
    /// Action named by the route, normalized by the adaptor.
    pub action: String,
    /// Earlier task this submission continues, if any.
    pub origin_task_id: Option<ExternalTaskId>,
    /// HTTP method of the inbound request.
    pub method: Method,
    /// Validated payload to forward upstream.
    pub payload: Option<Value>,
}

impl RelayContext {
    /// Creates an empty POST context for `platform`.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            user_id: UserId::default(),
            group: String::new(),
            user_group: String::new(),
            channel_id: ChannelId::default(),
            token_id: TokenId::default(),
            token_key: String::new(),
            token_name: String::new(),
            base_url: String::new(),
            api_key: String::new(),
            origin_model_name: String::new(),
            action: String::new(),
            origin_task_id: None,
            method: Method::POST,
            payload: None,
        }
    }
}

impl std::fmt::Debug for RelayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayContext")
            .field("platform", &self.platform)
            .field("user_id", &self.user_id)
            .field("group", &self.group)
            .field("channel_id", &self.channel_id)
            .field("token_id", &self.token_id)
            .field("base_url", &self.base_url)
            .field("origin_model_name", &self.origin_model_name)
            .field("action", &self.action)
            .field("origin_task_id", &self.origin_task_id)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Inbound request as received from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Decoded query parameters, in order; repeated keys are allowed.
    pub query: Vec<(String, String)>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl InboundRequest {
    /// Creates a POST request with a JSON body.
    #[must_use]
    pub fn post_json(body: &Value) -> Self {
        Self {
            method: Method::POST,
            query: Vec::new(),
            body: body.to_string().into_bytes(),
        }
    }

    /// Creates a GET request with query parameters.
    #[must_use]
    pub fn get(query: Vec<(String, String)>) -> Self {
        Self {
            method: Method::GET,
            query,
            body: Vec::new(),
        }
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` when the body is not valid JSON of type `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, TaskError> {
        serde_json::from_slice(&self.body)
            .map_err(|err| TaskError::local(TaskErrorKind::InvalidRequest, err.to_string()))
    }
}

/// Token counts reported by an upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: i64,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: i64,
    /// Total tokens.
    #[serde(default)]
    pub total_tokens: i64,
}

/// Response relayed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientReply {
    /// HTTP status.
    pub status: u16,
    /// `Content-Type` of `body`.
    pub content_type: String,
    /// Raw body.
    pub body: Vec<u8>,
}

impl ClientReply {
    /// Creates a 200 JSON reply.
    #[must_use]
    pub fn json(body: &Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_owned(),
            body: body.to_string().into_bytes(),
        }
    }

    /// Echoes an upstream response unchanged.
    #[must_use]
    pub fn passthrough(response: &UpstreamResponse) -> Self {
        Self {
            status: response.status,
            content_type: response
                .content_type
                .clone()
                .unwrap_or_else(|| "application/json".to_owned()),
            body: response.body.clone(),
        }
    }
}

/// Result of interpreting a successful submission response.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// Upstream task identifier; empty for non-submission pass-through calls.
    pub task_id: ExternalTaskId,
    /// Payload stored on the task.
    pub data: TaskPayload,
    /// Token usage, when the upstream reports it.
    pub usage: Option<Usage>,
    /// Reply for the caller.
    pub client_body: ClientReply,
}

/// One status query planned for a group of tasks on the same channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchQuery {
    /// Tasks covered by the query.
    pub task_ids: Vec<ExternalTaskId>,
    /// Platform-specific path segment, such as a model or a video kind.
    pub route: String,
    /// Client token forwarded for per-client upstream routing.
    pub client_token: Option<String>,
}

/// Uniform contract over heterogeneous upstream task providers.
#[async_trait]
pub trait TaskAdaptor: Send + Sync {
    /// Platform served by this adaptor.
    fn platform(&self) -> Platform;

    /// Prepares the context before validation.
    fn init(&self, context: &mut RelayContext) {
        let trimmed = context.base_url.trim_end_matches('/').to_owned();
        context.base_url = trimmed;
    }

    /// Validates the inbound request and records the action and payload.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for malformed requests.
    fn validate_request_and_set_action(
        &self,
        context: &mut RelayContext,
        request: &InboundRequest,
    ) -> Result<(), TaskError>;

    /// Returns the model name the submission is priced under.
    fn pricing_model(&self, context: &RelayContext) -> String {
        context.origin_model_name.clone()
    }

    /// Returns the upstream HTTP method for a submission.
    fn request_method(&self, _context: &RelayContext) -> Method {
        Method::POST
    }

    /// Builds the submission URL.
    ///
    /// # Errors
    ///
    /// Returns `build_request_failed` when routing data is missing.
    fn build_request_url(&self, context: &RelayContext) -> Result<String, TaskError>;

    /// Builds the submission headers.
    ///
    /// # Errors
    ///
    /// Returns `build_request_failed` for unrepresentable header values.
    fn build_request_header(&self, context: &RelayContext) -> Result<HeaderMap, TaskError>;

    /// Builds the submission body; `None` sends no body.
    ///
    /// # Errors
    ///
    /// Returns `build_request_failed` when the payload cannot be encoded.
    fn build_request_body(&self, context: &RelayContext) -> Result<Option<Vec<u8>>, TaskError> {
        context
            .payload
            .as_ref()
            .map(|payload| {
                serde_json::to_vec(payload)
                    .map_err(|err| TaskError::wrap(TaskErrorKind::BuildRequestFailed, err))
            })
            .transpose()
    }

    /// Sends the submission.
    ///
    /// # Errors
    ///
    /// Returns the transport failure unchanged.
    async fn do_request(
        &self,
        client: &UpstreamClient,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, FetchError> {
        client.submit(request).await
    }

    /// Interprets a 2xx submission response.
    ///
    /// # Errors
    ///
    /// Returns upstream or parse errors from the platform's error taxonomy.
    fn do_response(
        &self,
        context: &RelayContext,
        response: &UpstreamResponse,
    ) -> Result<SubmitOutcome, TaskError>;

    /// Groups unfinished tasks of one channel into status queries.
    fn plan_fetch(&self, tasks: &[Task]) -> Vec<FetchQuery>;

    /// Runs one status query and returns the raw body.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transport failure or a non-2xx status.
    async fn fetch_task(
        &self,
        client: &UpstreamClient,
        base_url: &str,
        key: &str,
        query: &FetchQuery,
    ) -> Result<Vec<u8>, FetchError>;

    /// Normalizes a status query response into upstream records.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the body is malformed or reports a
    /// business failure.
    fn parse_fetch_response(
        &self,
        query: &FetchQuery,
        body: &[u8],
    ) -> Result<Vec<UpstreamTaskRecord>, FetchError>;
}

/// Maps a header-construction failure to `build_request_failed`.
pub(crate) fn build_failed(err: impl std::fmt::Display) -> TaskError {
    TaskError::wrap(TaskErrorKind::BuildRequestFailed, err)
}

/// Parses a JSON body as `T`, mapping failures to `parse_response_failed`.
pub(crate) fn parse_submit_body<T: serde::de::DeserializeOwned>(
    body: &[u8],
) -> Result<T, TaskError> {
    serde_json::from_slice(body)
        .map_err(|err| TaskError::wrap(TaskErrorKind::ParseResponseFailed, err))
}
