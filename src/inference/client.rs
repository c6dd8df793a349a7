//! Streaming assistant client.
//!
//! Sends one chat completion request per call and reports the streamed
//! reasoning and answer fragments to a [`StreamObserver`] as they arrive.

use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client as HttpClient;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::config::{self, ApiSettings};
use super::errors::InferenceError;
use super::observer::{CollectingObserver, StreamObserver};
use super::request::{build_request, ContextSource, RequestOptions};
use super::streaming::{classify, line_stream};
use super::transport::{build_http_client, open_stream, Timeouts};
use super::types::{LlmResponse, StreamEvent};

// ─── AssistantClient ─────────────────────────────────────────────────────────

/// Client for the chat completion endpoint.
///
/// Cheap to clone; clones share the HTTP connection pool and the settings.
/// Every call takes a fresh snapshot of the settings, so overrides apply to
/// the next call without disturbing calls in flight.
#[derive(Clone)]
pub struct AssistantClient {
    http: HttpClient,
    settings: Arc<ApiSettings>,
    timeouts: Timeouts,
    options: RequestOptions,
}

impl AssistantClient {
    /// Create a client backed by the process-wide settings.
    pub fn new() -> Result<Self, InferenceError> {
        Self::from_settings(config::init())
    }

    /// Create a client backed by the given settings with default timeouts.
    pub fn from_settings(settings: Arc<ApiSettings>) -> Result<Self, InferenceError> {
        Self::from_settings_with_timeouts(settings, Timeouts::default())
    }

    pub fn from_settings_with_timeouts(
        settings: Arc<ApiSettings>,
        timeouts: Timeouts,
    ) -> Result<Self, InferenceError> {
        Ok(Self {
            http: build_http_client(timeouts)?,
            settings,
            timeouts,
            options: RequestOptions::default(),
        })
    }

    /// Override the completion token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = max_tokens;
        self
    }

    /// Turn the server-side reasoning stream on or off.
    pub fn with_reasoning(mut self, enabled: bool) -> Self {
        self.options.enable_reasoning = enabled;
        self
    }

    pub fn settings(&self) -> &Arc<ApiSettings> {
        &self.settings
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // ─── Streaming ───────────────────────────────────────────────────────

    /// Run one streaming call, reporting progress to `observer`.
    ///
    /// Returns `true` after `on_complete`, `false` after `on_error`. Exactly
    /// one of the two is called.
    pub async fn stream_completion(
        &self,
        prompt: &str,
        context: Option<&str>,
        observer: &dyn StreamObserver,
    ) -> bool {
        let span = tracing::info_span!("llm_stream", request_id = %Uuid::new_v4());

        async move {
            match self.drive(prompt, context, observer).await {
                Ok(response) => {
                    tracing::info!(
                        thinking_len = response.thinking_process.len(),
                        answer_len = response.final_answer.len(),
                        "stream complete"
                    );
                    observer.on_complete(&response.thinking_process, &response.final_answer);
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "error calling LLM API");
                    observer.on_error(&e.to_string());
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Like [`stream_completion`](Self::stream_completion), reading the
    /// design document from `source` once.
    pub async fn stream_with_source(
        &self,
        prompt: &str,
        source: &dyn ContextSource,
        observer: &dyn StreamObserver,
    ) -> bool {
        let document = source.context_document();
        self.stream_completion(prompt, document.as_deref(), observer)
            .await
    }

    /// Run one streaming call on its own task so the caller never waits on
    /// the network.
    ///
    /// Aborting the returned handle stops the call; no further callbacks are
    /// made after that.
    pub fn spawn_stream(
        &self,
        prompt: String,
        context: Option<String>,
        observer: Arc<dyn StreamObserver>,
    ) -> JoinHandle<bool> {
        let client = self.clone();
        tokio::spawn(async move {
            client
                .stream_completion(&prompt, context.as_deref(), observer.as_ref())
                .await
        })
    }

    /// Run one call and return the whole response, or `None` if it failed.
    pub async fn complete(&self, prompt: &str, context: Option<&str>) -> Option<LlmResponse> {
        let collector = CollectingObserver::new();
        if self.stream_completion(prompt, context, &collector).await {
            Some(collector.into_response())
        } else {
            None
        }
    }

    /// Send the request and consume the event stream until the body closes.
    ///
    /// The `[DONE]` sentinel is logged but does not stop the loop: some
    /// servers keep sending lines after it.
    async fn drive(
        &self,
        prompt: &str,
        context: Option<&str>,
        observer: &dyn StreamObserver,
    ) -> Result<LlmResponse, InferenceError> {
        let config = self.settings.snapshot();
        let body = build_request(&config, prompt, context, self.options);

        let response = open_stream(&self.http, &config, &body, self.timeouts.read).await?;
        let mut lines = pin!(line_stream(
            Box::pin(response.bytes_stream()),
            self.timeouts.read,
        ));

        let mut accumulated = LlmResponse::default();
        while let Some(line) = lines.next().await {
            let line = line?;
            tracing::debug!(line = %line, "recv stream");

            match classify(&line) {
                StreamEvent::Reasoning(text) => {
                    accumulated.thinking_process.push_str(&text);
                    observer.on_thinking_process(&text);
                }
                StreamEvent::Answer(text) => {
                    accumulated.final_answer.push_str(&text);
                    observer.on_final_answer(&text);
                }
                StreamEvent::Done => tracing::debug!("end sentinel received, reading until close"),
                StreamEvent::Skip => {}
            }
        }

        Ok(accumulated)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
