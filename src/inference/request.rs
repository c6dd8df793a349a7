//! Request building.
//!
//! Every call sends the same two-message conversation: a fixed system
//! instruction for the circuit-design domain, then the user's question with
//! the serialized design appended when one is available.

use super::config::ApiConfig;
use super::types::{ChatCompletionRequest, ChatMessage, ThinkingConfig};

/// Default completion budget.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// System instruction sent with every request.
pub const SYSTEM_INSTRUCTION: &str = "你是一个数字电路设计专家。用户会提供 logisim-evolution 的 circ 格式电路数据和问题。请分析电路并提供改进建议。\n\
You are an expert in digital circuit design. The user provides circuit data in logisim-evolution's circ format together with a question. Analyze the circuit and suggest improvements.";

const QUESTION_PREFIX: &str = "user question: ";
const CONTEXT_HEADER: &str = "circuit data (circ format):\n";

/// Supplies the serialized design under discussion.
///
/// The returned document is opaque to this crate; it is appended to the
/// request as-is.
pub trait ContextSource: Send + Sync {
    fn context_document(&self) -> Option<String>;
}

impl<F> ContextSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn context_document(&self) -> Option<String> {
        self()
    }
}

/// Per-call request options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub max_tokens: u32,
    /// Ask the server to stream its reasoning separately from the answer.
    pub enable_reasoning: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            enable_reasoning: true,
        }
    }
}

/// Build the streaming request for `prompt`, attaching `context` when present.
pub fn build_request(
    config: &ApiConfig,
    prompt: &str,
    context: Option<&str>,
    options: RequestOptions,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: config.model.clone(),
        max_tokens: options.max_tokens,
        stream: true,
        thinking: options.enable_reasoning.then(ThinkingConfig::enabled),
        messages: vec![
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(user_content(prompt, context)),
        ],
    }
}

/// The user message body: the question, then the design document if any.
pub fn user_content(prompt: &str, context: Option<&str>) -> String {
    let mut content = format!("{QUESTION_PREFIX}{prompt}\n\n");
    if let Some(document) = context.filter(|d| !d.is_empty()) {
        content.push_str(CONTEXT_HEADER);
        content.push_str(document);
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::Role;

    #[test]
    fn test_build_request_without_context() {
        let config = ApiConfig {
            model: "deepseek-r1".into(),
            ..ApiConfig::default()
        };
        let req = build_request(&config, "explain this circuit", None, RequestOptions::default());

        assert_eq!(req.model, "deepseek-r1");
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(req.stream);
        assert_eq!(req.thinking, Some(ThinkingConfig::enabled()));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[0].content, SYSTEM_INSTRUCTION);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.messages[1].content, "user question: explain this circuit\n\n");
    }

    #[test]
    fn test_context_appended_verbatim() {
        let doc = "<project source=\"3.8\">\n  <circuit name=\"main\"/>\n</project>";
        let content = user_content("why", Some(doc));
        assert_eq!(
            content,
            format!("user question: why\n\ncircuit data (circ format):\n{doc}")
        );
    }

    #[test]
    fn test_empty_context_is_not_attached() {
        assert_eq!(user_content("q", Some("")), "user question: q\n\n");
    }

    #[test]
    fn test_reasoning_can_be_disabled() {
        let options = RequestOptions {
            max_tokens: 512,
            enable_reasoning: false,
        };
        let req = build_request(&ApiConfig::default(), "q", None, options);
        assert!(req.thinking.is_none());
        assert_eq!(req.max_tokens, 512);
    }

    #[test]
    fn test_closure_context_source() {
        let source = || Some("<project/>".to_string());
        assert_eq!(source.context_document().as_deref(), Some("<project/>"));
    }
}
