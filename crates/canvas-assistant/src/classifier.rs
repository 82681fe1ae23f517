//! One-time classification of a turn from its earliest chunks

use canvas_ai::{Chunk, Delta, FinishReason};

/// What kind of turn a chunk reveals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The backend is requesting capability invocations
    ToolCall,
    /// The backend is answering with plain text
    AssistantMessage,
    /// Metadata only; keep reading
    Indeterminate,
}

/// Classify a turn from one of its early chunks.
///
/// A tool-call fragment or a `tool_calls` finish reason wins over text, so
/// a chunk carrying both is a tool-call chunk.
pub fn classify(chunk: &Chunk) -> Classification {
    if chunk.finish_reason == Some(FinishReason::ToolCalls) {
        return Classification::ToolCall;
    }
    match &chunk.delta {
        Delta::ToolCall(_) => Classification::ToolCall,
        Delta::Text { text } if !text.is_empty() => Classification::AssistantMessage,
        _ => Classification::Indeterminate,
    }
}
