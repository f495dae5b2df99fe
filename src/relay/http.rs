//! Shared HTTP client for upstream submissions and status queries.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const BODY_PREVIEW_LIMIT: usize = 512;
const FINGERPRINT_BYTES: usize = 6;

/// Failure class of an upstream exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The request exceeded its deadline.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The request could not be built or sent.
    Request,
    /// The response body could not be read.
    Body,
    /// The response body could not be decoded.
    Decode,
    /// The upstream answered with a non-success HTTP status.
    Status,
    /// The upstream answered with a business error code.
    Upstream,
    /// Any other failure.
    Unknown,
}

impl FetchErrorKind {
    /// Returns the short label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Upstream => "upstream",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised while talking to an upstream provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("upstream {kind} error: {message}")]
pub struct FetchError {
    kind: FetchErrorKind,
    status: Option<u16>,
    message: String,
}

impl FetchError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Creates an error for a non-success HTTP status.
    #[must_use]
    pub fn status(status: u16, body: &[u8]) -> Self {
        Self {
            kind: FetchErrorKind::Status,
            status: Some(status),
            message: format!("status={status} body={}", preview_body(body)),
        }
    }

    /// Creates an error for an undecodable body.
    #[must_use]
    pub fn decode(err: &serde_json::Error, body: &[u8]) -> Self {
        Self::new(
            FetchErrorKind::Decode,
            format!("failed to decode response body: {err} | body={}", preview_body(body)),
        )
    }

    /// Creates an error for an upstream business failure.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Upstream, message)
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_connect() {
            FetchErrorKind::Connect
        } else if err.is_request() || err.is_builder() {
            FetchErrorKind::Request
        } else if err.is_body() {
            FetchErrorKind::Body
        } else if err.is_decode() {
            FetchErrorKind::Decode
        } else {
            FetchErrorKind::Unknown
        };
        Self {
            kind,
            status: err.status().map(|code| code.as_u16()),
            message: err.to_string(),
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    /// Returns the HTTP status when one was received.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the diagnostic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Returns at most the first 512 characters of a body for diagnostics.
#[must_use]
pub fn preview_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_owned();
    }
    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

/// Returns a short, stable, non-reversible tag for a client token.
///
/// Tokens are never logged in clear text.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest
        .iter()
        .take(FINGERPRINT_BYTES)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Outgoing request assembled by an adaptor.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// JSON body, absent for bodiless requests.
    pub body: Option<Vec<u8>>,
}

/// Fully-read upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header value, if any.
    pub content_type: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Builds the bearer-authenticated JSON headers every adaptor sends.
///
/// # Errors
///
/// Returns [`FetchErrorKind::Request`] when the key is not a valid header value.
pub fn json_headers(key: &str) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
        .map_err(|err| FetchError::new(FetchErrorKind::Request, err.to_string()))?;
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}

/// Adds a custom header to `headers`.
///
/// # Errors
///
/// Returns [`FetchErrorKind::Request`] when the name or value is invalid.
pub fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), FetchError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| FetchError::new(FetchErrorKind::Request, err.to_string()))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|err| FetchError::new(FetchErrorKind::Request, err.to_string()))?;
    headers.insert(header_name, header_value);
    Ok(())
}

/// Upstream HTTP client with separate submit and status-query deadlines.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    submit_timeout: Duration,
    fetch_timeout: Duration,
}

impl UpstreamClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchErrorKind::Request`] when the TLS backend cannot be
    /// initialised.
    pub fn new(submit_timeout: Duration, fetch_timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| FetchError::from_reqwest(&err))?;
        Ok(Self {
            http,
            submit_timeout,
            fetch_timeout,
        })
    }

    /// Returns the status-query deadline.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Sends a submission and returns the response whatever its status.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the exchange fails at the transport level
    /// or the body cannot be read.
    pub async fn submit(&self, request: UpstreamRequest) -> Result<UpstreamResponse, FetchError> {
        self.exchange(request, self.submit_timeout).await
    }

    /// Sends a status query and returns the body of a 2xx response.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transport failure or a non-2xx status.
    pub async fn fetch(&self, request: UpstreamRequest) -> Result<Vec<u8>, FetchError> {
        let response = self.exchange(request, self.fetch_timeout).await?;
        if !response.is_success() {
            return Err(FetchError::status(response.status, &response.body));
        }
        Ok(response.body)
    }

    async fn exchange(
        &self,
        request: UpstreamRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, FetchError> {
        let UpstreamRequest {
            method,
            url,
            headers,
            body,
        } = request;
        tracing::debug!(
            target: "taskrelay::adaptor",
            stage = "upstream.http.in",
            method = %method,
            url = %url,
            timeout_ms = timeout.as_millis()
        );
        let mut builder = self
            .http
            .request(method, &url)
            .headers(headers)
            .timeout(timeout);
        if let Some(bytes) = body {
            builder = builder.body(bytes);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(&err))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(|err| {
            FetchError::new(FetchErrorKind::Body, err.to_string())
        })?;
        tracing::debug!(
            target: "taskrelay::adaptor",
            stage = "upstream.http.out",
            url = %url,
            status,
            body_len = bytes.len()
        );
        Ok(UpstreamResponse {
            status,
            content_type,
            body: bytes.to_vec(),
        })
    }
}
