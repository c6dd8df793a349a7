//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. The display string
//! is what observers receive in `on_error`, so it is written for humans.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the completion endpoint.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the endpoint failed, or the request could not be written.
    #[error("error calling LLM API at {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not respond (or stopped sending) within the read timeout.
    #[error("LLM API timed out after {duration:?} without data")]
    Timeout { duration: Duration },

    /// Non-2xx HTTP response from the endpoint.
    #[error("API call failed with response code: {status}{}", error_suffix(.body))]
    HttpError { status: u16, body: String },

    /// The response body failed mid-stream.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// Configuration loading error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

/// Appends the server's error body, if one could be read.
fn error_suffix(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        format!(", error: {body}")
    }
}

impl InferenceError {
    /// The HTTP status code, if this is an `HttpError`.
    pub fn status(&self) -> Option<u16> {
        match self {
            InferenceError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}
