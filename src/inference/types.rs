//! Shared types for the assistant client.
//!
//! Request types mirror the chat completions wire format; response types are
//! deliberately permissive because servers disagree on chunk shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// Switches server-side reasoning output on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThinkingConfig {
    pub r#type: String,
}

impl ThinkingConfig {
    pub fn enabled() -> Self {
        Self {
            r#type: "enabled".to_string(),
        }
    }
}

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
    pub stream: bool,
    /// Present when reasoning output is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    pub messages: Vec<ChatMessage>,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// One `data:` payload of the event stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Option<Vec<ChunkChoice>>,
}

/// A single choice within a chunk.
///
/// Incremental servers send `delta`; others send a full `message` per chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkPayload>,
    #[serde(default)]
    pub message: Option<ChunkPayload>,
}

/// The text-carrying container inside a choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkPayload {
    /// Model deliberation text.
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// User-facing answer text.
    #[serde(default)]
    pub content: Option<String>,
}

/// The classification of one line of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A reasoning fragment.
    Reasoning(String),
    /// An answer fragment.
    Answer(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Anything else: keep-alives, comments, malformed or unrecognized chunks.
    Skip,
}

// ─── Result ──────────────────────────────────────────────────────────────────

/// The accumulated output of one completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmResponse {
    pub thinking_process: String,
    pub final_answer: String,
}

impl LlmResponse {
    pub fn new(thinking_process: impl Into<String>, final_answer: impl Into<String>) -> Self {
        Self {
            thinking_process: thinking_process.into(),
            final_answer: final_answer.into(),
        }
    }

    pub fn has_thinking_process(&self) -> bool {
        !self.thinking_process.is_empty()
    }

    pub fn has_final_answer(&self) -> bool {
        !self.final_answer.is_empty()
    }
}

impl fmt::Display for LlmResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_thinking_process() {
            write!(f, "[Thinking Process]\n{}\n\n", self.thinking_process)?;
        }
        if self.has_final_answer() {
            write!(f, "[Final Answer]\n{}", self.final_answer)?;
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = ChatCompletionRequest {
            model: "deepseek-r1".to_string(),
            max_tokens: 2048,
            stream: true,
            thinking: Some(ThinkingConfig::enabled()),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["maxTokens"], 2048);
        assert_eq!(json["stream"], true);
        assert_eq!(json["thinking"]["type"], "enabled");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_thinking_omitted_when_none() {
        let req = ChatCompletionRequest {
            model: "m".to_string(),
            max_tokens: 16,
            stream: true,
            thinking: None,
            messages: vec![],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("thinking"));
    }

    #[test]
    fn test_chunk_with_null_fields_deserializes() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"c1","choices":[{"index":0,"delta":{"role":"assistant","content":null,"reasoning_content":"hm"}}]}"#,
        )
        .unwrap();
        let choice = &chunk.choices.unwrap()[0];
        let delta = choice.delta.as_ref().unwrap();
        assert_eq!(delta.reasoning_content.as_deref(), Some("hm"));
        assert!(delta.content.is_none());
        assert!(choice.message.is_none());
    }

    #[test]
    fn test_response_display_sections() {
        let both = LlmResponse::new("thinking", "answer");
        assert_eq!(
            both.to_string(),
            "[Thinking Process]\nthinking\n\n[Final Answer]\nanswer"
        );

        let answer_only = LlmResponse::new("", "42");
        assert!(!answer_only.has_thinking_process());
        assert_eq!(answer_only.to_string(), "[Final Answer]\n42");
        assert_eq!(LlmResponse::default().to_string(), "");
    }
}
