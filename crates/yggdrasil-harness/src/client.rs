// crates/yggdrasil-harness/src/client.rs
// ============================================================================
// Module: API Client
// Description: Bearer-authenticated HTTP client bound to one service base URL.
// Purpose: Issue REST calls with retries and transcripts, decoding envelopes once.
// Dependencies: reqwest, tokio, tracing, yggdrasil-core, yggdrasil-config
// ============================================================================

//! ## Overview
//! [`ApiClient`] issues requests relative to a base URL and returns a uniform
//! `Result<ApiResponse, ApiError>`. The response envelope is decoded exactly
//! once here; callers branch on [`ApiError::response`] to tell "server
//! rejected" from "server unreachable".
//!
//! Retries follow the configured [`RetryPolicy`] with linear backoff. 429/503
//! replies and connection failures are always retried; timeouts and other
//! mid-flight transport failures are retried only for idempotent methods, so a
//! toggle POST is never delivered twice. Every request, retried or not, lands
//! in a shared [`Transcript`] without bodies or credentials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::debug;
use yggdrasil_config::HarnessConfig;
use yggdrasil_config::RetryPolicy;
use yggdrasil_core::Envelope;
use yggdrasil_core::HEALTH_PATH;
use yggdrasil_core::HttpMethod;
use yggdrasil_core::ServiceName;
use yggdrasil_core::decode_envelope;

use crate::error::ApiError;
use crate::error::ErrorResponse;
use crate::error::TransportKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Statuses that indicate transient server pressure.
const RETRYABLE_STATUSES: [u16; 2] = [429, 503];
/// Timeout for liveness probes.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Successful (2xx) reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded `data` (or the whole body when not enveloped).
    pub data: Value,
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    /// 1-based order across the shared transcript.
    pub sequence: u64,
    /// Client label.
    pub service: String,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Final HTTP status, when a reply arrived.
    pub status: Option<u16>,
    /// Attempts made, including retries.
    pub attempts: u32,
    /// Error summary, when the call failed.
    pub error: Option<String>,
}

/// Per-call overrides for [`ApiClient::request_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Timeout for each attempt; the client timeout when `None`.
    pub timeout: Option<Duration>,
    /// Retry policy for this call; the client policy when `None`.
    pub retry: Option<RetryPolicy>,
}

impl RequestOptions {
    /// Options that override only the timeout.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            retry: None,
        }
    }

    /// Options that override only the retry policy.
    #[must_use]
    pub const fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            timeout: None,
            retry: Some(retry),
        }
    }
}

/// Shared, append-only request log.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Arc<Mutex<Vec<TranscriptEntry>>>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.lock().map_or_else(|_| Vec::new(), |entries| entries.clone())
    }

    /// Returns the number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Returns true when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, mut entry: TranscriptEntry) {
        let Ok(mut guard) = self.entries.lock() else {
            return;
        };
        entry.sequence = u64::try_from(guard.len()).unwrap_or(u64::MAX).saturating_add(1);
        guard.push(entry);
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// HTTP client bound to one base URL.
#[derive(Clone)]
pub struct ApiClient {
    label: String,
    base_url: String,
    http: Client,
    token: Option<String>,
    retry: RetryPolicy,
    transcript: Transcript,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("label", &self.label)
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the HTTP client cannot be built.
    pub fn new(
        label: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let label = label.into();
        let http = Client::builder().timeout(timeout).build().map_err(|err| ApiError::Transport {
            service: label.clone(),
            kind: TransportKind::Other,
            message: format!("failed to build http client: {err}"),
        })?;
        Ok(Self {
            label,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            token: None,
            retry,
            transcript: Transcript::new(),
        })
    }

    /// Creates an unauthenticated client for a configured service.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the HTTP client cannot be built.
    pub fn for_service(config: &HarnessConfig, service: ServiceName) -> Result<Self, ApiError> {
        Self::new(service.as_str(), config.service_url(service), config.timeouts.api, config.retry)
    }

    /// Returns the client with a bearer token attached.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns the client recording into `transcript`.
    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    /// Replaces the bearer token for subsequent calls.
    pub fn set_auth_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// Drops the bearer token for subsequent calls.
    pub fn clear_auth_token(&mut self) {
        self.token = None;
    }

    /// Returns the bearer token, if any.
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the client label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the shared transcript.
    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Issues a GET request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx reply.
    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Get, path, None).await
    }

    /// Issues a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx reply.
    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Post, path, body).await
    }

    /// Issues a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx reply.
    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Put, path, body).await
    }

    /// Issues a PATCH request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx reply.
    pub async fn patch(&self, path: &str, body: Option<&Value>) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Patch, path, body).await
    }

    /// Issues a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx reply.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Delete, path, None).await
    }

    /// Issues a request, retrying per the client's [`RetryPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx reply, or a 2xx
    /// reply whose body does not decode.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        self.request_with(method, path, body, &RequestOptions::default()).await
    }

    /// Issues a request with per-call timeout and retry overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx reply, or a 2xx
    /// reply whose body does not decode.
    pub async fn request_with(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);
        let retry = options.retry.unwrap_or(self.retry);
        let attempts = retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self.send_once(method, &url, body, options.timeout).await;
            if attempt < attempts && should_retry(method, &result) {
                let delay = retry.backoff(attempt);
                debug!(
                    service = %self.label,
                    %method,
                    path,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying request"
                );
                sleep(delay).await;
                attempt += 1;
                continue;
            }
            self.record(method, path, &result, attempt);
            return result;
        }
    }

    /// Probes the liveness path; never errors.
    ///
    /// Any 2xx reply counts as alive, whatever its body.
    pub async fn health_check(&self) -> bool {
        let options = RequestOptions {
            timeout: Some(HEALTH_TIMEOUT),
            retry: Some(RetryPolicy::NONE),
        };
        let result = self.request_with(HttpMethod::Get, HEALTH_PATH, None, &options).await;
        match result {
            Ok(_) => true,
            Err(ApiError::Decode { status, .. }) => (200..300).contains(&status),
            Err(_) => false,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse, ApiError> {
        let mut builder = self.http.request(reqwest_method(method), url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(|err| self.transport_error(&err))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|err| self.transport_error(&err))?;
        match decode_envelope(status, &bytes) {
            Ok(Envelope::Success(data)) => Ok(ApiResponse {
                status,
                data,
            }),
            Ok(Envelope::Failure(envelope)) => Err(ApiError::Status(ErrorResponse {
                status,
                envelope,
            })),
            Err(err) => Err(ApiError::Decode {
                status,
                message: err.to_string(),
            }),
        }
    }

    fn transport_error(&self, err: &reqwest::Error) -> ApiError {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else {
            TransportKind::Other
        };
        ApiError::Transport {
            service: self.label.clone(),
            kind,
            message: err.to_string(),
        }
    }

    fn record(
        &self,
        method: HttpMethod,
        path: &str,
        result: &Result<ApiResponse, ApiError>,
        attempts: u32,
    ) {
        let (status, error) = match result {
            Ok(response) => (Some(response.status), None),
            Err(err) => (err.status(), Some(err.to_string())),
        };
        debug!(service = %self.label, %method, path, status, attempts, "http call");
        self.transcript.record(TranscriptEntry {
            sequence: 0,
            service: self.label.clone(),
            method: method.as_str().to_string(),
            path: path.to_string(),
            status,
            attempts,
            error,
        });
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when a result is worth another attempt.
///
/// A refused connection never reached the server. Any other transport failure
/// may have been applied, so only idempotent methods are replayed.
fn should_retry(method: HttpMethod, result: &Result<ApiResponse, ApiError>) -> bool {
    match result {
        Err(ApiError::Transport { kind, .. }) => *kind == TransportKind::Connect || method.is_idempotent(),
        Err(ApiError::Status(response)) => RETRYABLE_STATUSES.contains(&response.status),
        Ok(_) | Err(ApiError::Decode { .. }) => false,
    }
}

fn reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}
