//! HTTP transport for the completion endpoint.
//!
//! Owns the connection settings and performs the POST. A successful call
//! hands back the live response; the caller frames its body into lines.

use std::time::Duration;

use reqwest::Client as HttpClient;

use super::config::ApiConfig;
use super::errors::InferenceError;
use super::types::ChatCompletionRequest;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest wait for response headers or for the next piece of the body.
///
/// Reasoning models can think for a while before the first token, so this is
/// per read rather than for the whole response.
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection and read bounds for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: CONNECT_TIMEOUT,
            read: READ_TIMEOUT,
        }
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Build the HTTP client used for streaming requests.
pub fn build_http_client(timeouts: Timeouts) -> Result<HttpClient, InferenceError> {
    HttpClient::builder()
        .connect_timeout(timeouts.connect)
        .build()
        .map_err(|e| InferenceError::ConnectionFailed {
            endpoint: "(client setup)".to_string(),
            reason: format!("failed to build streaming HTTP client: {e}"),
        })
}

/// POST `body` to the completions endpoint and wait for the response headers.
///
/// Non-2xx responses are turned into [`InferenceError::HttpError`] carrying
/// whatever error body the server sent.
pub async fn open_stream(
    http: &HttpClient,
    config: &ApiConfig,
    body: &ChatCompletionRequest,
    read_timeout: Duration,
) -> Result<reqwest::Response, InferenceError> {
    let url = config.completions_url();

    // Log the request metadata (not the body: it carries the whole design)
    tracing::info!(
        url = %url,
        model = %body.model,
        message_count = body.messages.len(),
        max_tokens = body.max_tokens,
        stream = body.stream,
        thinking = body.thinking.is_some(),
        "=== LLM REQUEST ==="
    );

    let mut request = http
        .post(&url)
        .json(body)
        .header("Accept", "text/event-stream")
        .header("api-key", &config.api_key);
    if !config.api_key.is_empty() {
        request = request.bearer_auth(&config.api_key);
    }

    let response = match tokio::time::timeout(read_timeout, request.send()).await {
        Ok(result) => result.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration: read_timeout,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?,
        Err(_) => {
            return Err(InferenceError::Timeout {
                duration: read_timeout,
            })
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body_text = match tokio::time::timeout(read_timeout, response.text()).await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        };
        tracing::error!(status = status.as_u16(), body = %body_text, "API call failed");
        return Err(InferenceError::HttpError {
            status: status.as_u16(),
            body: body_text,
        });
    }

    Ok(response)
}
