//! Observers for streaming calls.
//!
//! A call reports through exactly one [`StreamObserver`]: zero or more
//! fragment callbacks in wire order, then exactly one of `on_complete` or
//! `on_error`.
//!
//! Callbacks run on the worker that reads the network. UI code should not
//! touch its widgets from them directly; [`ChannelObserver`] forwards every
//! callback as a [`StreamUpdate`] so the UI loop can apply it on its own thread.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use super::types::LlmResponse;

/// Receives the progress of one streaming call.
pub trait StreamObserver: Send + Sync {
    /// A fragment of the model's reasoning.
    fn on_thinking_process(&self, fragment: &str);

    /// A fragment of the user-facing answer.
    fn on_final_answer(&self, fragment: &str);

    /// The stream closed normally. Arguments are the full accumulated texts.
    fn on_complete(&self, thinking_process: &str, final_answer: &str);

    /// The call failed. No further callbacks follow.
    fn on_error(&self, message: &str);
}

// ─── Collecting ──────────────────────────────────────────────────────────────

/// Buffers fragments so a caller can get the whole response at once.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    collected: Mutex<LlmResponse>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything collected so far.
    pub fn into_response(self) -> LlmResponse {
        self.collected
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with_collected(&self, f: impl FnOnce(&mut LlmResponse)) {
        let mut collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut collected);
    }
}

impl StreamObserver for CollectingObserver {
    fn on_thinking_process(&self, fragment: &str) {
        self.with_collected(|r| r.thinking_process.push_str(fragment));
    }

    fn on_final_answer(&self, fragment: &str) {
        self.with_collected(|r| r.final_answer.push_str(fragment));
    }

    fn on_complete(&self, _thinking_process: &str, _final_answer: &str) {}

    fn on_error(&self, message: &str) {
        tracing::error!(error = %message, "error during streaming");
    }
}

// ─── Channel ─────────────────────────────────────────────────────────────────

/// One observer callback, as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    Thinking(String),
    Answer(String),
    Complete {
        thinking_process: String,
        final_answer: String,
    },
    Error(String),
}

impl StreamUpdate {
    /// Whether this is the last update of a call.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamUpdate::Complete { .. } | StreamUpdate::Error(_))
    }
}

/// Forwards callbacks over an unbounded channel, preserving their order.
///
/// If the receiving side has gone away the updates are dropped; the call
/// itself still runs to completion.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StreamUpdate>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<StreamUpdate>) -> Self {
        Self { tx }
    }

    /// An observer plus the receiver the UI loop should drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, update: StreamUpdate) {
        if self.tx.send(update).is_err() {
            tracing::debug!("stream update receiver dropped");
        }
    }
}

impl StreamObserver for ChannelObserver {
    fn on_thinking_process(&self, fragment: &str) {
        self.send(StreamUpdate::Thinking(fragment.to_string()));
    }

    fn on_final_answer(&self, fragment: &str) {
        self.send(StreamUpdate::Answer(fragment.to_string()));
    }

    fn on_complete(&self, thinking_process: &str, final_answer: &str) {
        self.send(StreamUpdate::Complete {
            thinking_process: thinking_process.to_string(),
            final_answer: final_answer.to_string(),
        });
    }

    fn on_error(&self, message: &str) {
        self.send(StreamUpdate::Error(message.to_string()));
    }
}
