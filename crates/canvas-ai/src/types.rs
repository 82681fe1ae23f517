//! Core types for chat-completion interactions

use serde::{Deserialize, Serialize};

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Whether a log ending in this role is waiting for the backend to respond
    pub fn awaits_response(&self) -> bool {
        matches!(self, Role::User | Role::Tool)
    }
}

/// A capability invocation requested by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    /// Capability name
    pub name: String,
    /// Raw argument text exactly as streamed
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One entry in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Text content, possibly empty
    #[serde(default)]
    pub content: String,
    /// Present only on assistant messages that request capability invocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Present only on tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool messages only: the content is an error payload
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
            is_error: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, text)
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text)
    }

    /// Create a plain assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, text)
    }

    /// Create an assistant message that carries capability invocations
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, "")
        }
    }

    /// Create a tool result message
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            is_error,
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// Whether this is an assistant message requesting capability invocations
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }

    /// Reasoning text wrapped in a leading `<think>` block, if any
    pub fn thinking(&self) -> Option<&str> {
        split_thinking(&self.content).0
    }

    /// Content with any leading `<think>` block removed
    pub fn visible_text(&self) -> &str {
        split_thinking(&self.content).1
    }
}

/// Split text into its leading `<think>` block and the visible remainder.
///
/// An unterminated block yields empty visible text: the model is still
/// reasoning and has produced nothing to show yet.
pub fn split_thinking(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content.trim_start().strip_prefix("<think>") else {
        return (None, content);
    };
    match rest.find("</think>") {
        Some(end) => (
            Some(rest[..end].trim()),
            rest[end + "</think>".len()..].trim_start(),
        ),
        None => (Some(rest.trim()), ""),
    }
}

/// Why the backend ended a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of response
    Stop,
    /// Capability invocation requested
    ToolCalls,
    /// Maximum tokens reached
    Length,
    /// Response filtered by the backend
    ContentFilter,
    /// Any reason this crate does not know about
    #[serde(other)]
    Other,
}

impl FinishReason {
    /// Parse a wire value, mapping unknown reasons to `Other`
    pub fn parse(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "tool_calls" => FinishReason::ToolCalls,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        }
    }
}

/// A fragment of a streamed capability invocation.
///
/// A present `call_id` opens a new call slot; an absent one continues the
/// most recently opened slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Incremental payload of a chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// Metadata only (role announcement, usage, keep-alive)
    #[default]
    Empty,
    /// Assistant text
    Text { text: String },
    /// Capability invocation fragment
    ToolCall(ToolCallFragment),
}

/// One unit of a streamed backend response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Shared by every chunk of one logical response
    pub turn_id: String,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl Chunk {
    /// A metadata-only chunk
    pub fn empty(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            delta: Delta::Empty,
            finish_reason: None,
        }
    }

    /// A text delta
    pub fn text(turn_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            delta: Delta::Text { text: text.into() },
            ..Self::empty(turn_id)
        }
    }

    /// A fragment opening a new call slot
    pub fn open_call(
        turn_id: impl Into<String>,
        call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            delta: Delta::ToolCall(ToolCallFragment {
                call_id: Some(call_id.into()),
                name: Some(name.into()),
                arguments: None,
            }),
            ..Self::empty(turn_id)
        }
    }

    /// A fragment continuing the most recently opened call slot
    pub fn call_arguments(turn_id: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            delta: Delta::ToolCall(ToolCallFragment {
                call_id: None,
                name: None,
                arguments: Some(fragment.into()),
            }),
            ..Self::empty(turn_id)
        }
    }

    /// A terminal chunk with no payload
    pub fn finish(turn_id: impl Into<String>, reason: FinishReason) -> Self {
        Self::empty(turn_id).with_finish(reason)
    }

    /// Attach a finish reason
    pub fn with_finish(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    /// Text carried by this chunk, if any
    pub fn text_delta(&self) -> Option<&str> {
        match &self.delta {
            Delta::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Tool-call fragment carried by this chunk, if any
    pub fn tool_call_fragment(&self) -> Option<&ToolCallFragment> {
        match &self.delta {
            Delta::ToolCall(fragment) => Some(fragment),
            _ => None,
        }
    }

    /// Whether this chunk ends its turn
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Function-calling declaration for one capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySchema {
    /// Capability name (used in API calls)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

impl CapabilitySchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One streaming request: the full log plus the declared capabilities
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<CapabilitySchema>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>, tools: Vec<CapabilitySchema>) -> Self {
        Self { messages, tools }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_awaits_response() {
        assert!(Role::User.awaits_response());
        assert!(Role::Tool.awaits_response());
        assert!(!Role::Assistant.awaits_response());
        assert!(!Role::System.awaits_response());
    }

    #[test]
    fn test_tool_result_message() {
        let msg = Message::tool_result("c1", "{\"ok\":true}", false);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert!(!msg.is_error);
    }

    #[test]
    fn test_message_json_shape() {
        let msg = Message::assistant_tool_calls(vec![ToolCall::new("c1", "set_title", "{}")]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["tool_calls"][0]["id"], "c1");
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("is_error").is_none());
    }

    #[test]
    fn test_visible_text_strips_thinking() {
        let msg = Message::assistant("<think>pondering</think>\n\nThe answer is 4");
        assert_eq!(msg.thinking(), Some("pondering"));
        assert_eq!(msg.visible_text(), "The answer is 4");
    }

    #[test]
    fn test_visible_text_unterminated_thinking() {
        let msg = Message::assistant("<think>still going");
        assert_eq!(msg.thinking(), Some("still going"));
        assert_eq!(msg.visible_text(), "");
    }

    #[test]
    fn test_visible_text_plain() {
        let msg = Message::assistant("plain");
        assert_eq!(msg.thinking(), None);
        assert_eq!(msg.visible_text(), "plain");
    }

    #[test]
    fn test_split_thinking_partial_stream() {
        assert_eq!(split_thinking("<think>hmm"), (Some("hmm"), ""));
        assert_eq!(split_thinking("<think>a</think>Hi"), (Some("a"), "Hi"));
        assert_eq!(split_thinking("Hi <think>"), (None, "Hi <think>"));
    }

    #[test]
    fn test_finish_reason_parse() {
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse("function_call"), FinishReason::Other);
    }

    #[test]
    fn test_finish_reason_unknown_deserializes() {
        let reason: FinishReason = serde_json::from_str("\"eos\"").unwrap();
        assert_eq!(reason, FinishReason::Other);
    }

    #[test]
    fn test_chunk_accessors() {
        let chunk = Chunk::text("t1", "Hel");
        assert_eq!(chunk.text_delta(), Some("Hel"));
        assert!(chunk.tool_call_fragment().is_none());
        assert!(!chunk.is_terminal());

        let chunk = Chunk::open_call("t1", "c1", "set_title").with_finish(FinishReason::ToolCalls);
        let fragment = chunk.tool_call_fragment().unwrap();
        assert_eq!(fragment.call_id.as_deref(), Some("c1"));
        assert!(chunk.is_terminal());
    }
}
