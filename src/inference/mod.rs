//! Assistant inference: a streaming client for OpenAI-compatible chat
//! completion endpoints.
//!
//! This module handles all communication with the model endpoint:
//! - Layered API configuration (defaults, properties file, `.env`, environment)
//! - Request building for the circuit-design assistant conversation
//! - Line framing of the event stream and per-line classification into
//!   reasoning and answer fragments
//! - Observer delivery, including a channel observer for UI threads
//!
//! Malformed chunks are dropped quietly. Only transport failures and
//! non-success statuses reach the observer's `on_error`.

pub mod client;
pub mod config;
pub mod errors;
pub mod observer;
pub mod request;
pub mod streaming;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::AssistantClient;
pub use config::{ApiConfig, ApiSettings, ConfigOverride};
pub use errors::InferenceError;
pub use observer::{ChannelObserver, CollectingObserver, StreamObserver, StreamUpdate};
pub use request::ContextSource;
pub use streaming::classify;
pub use transport::Timeouts;
pub use types::{LlmResponse, StreamEvent};
