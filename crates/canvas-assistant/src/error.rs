//! Error types for canvas-assistant

use std::time::Duration;
use thiserror::Error;

/// Result type alias using canvas-assistant Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or driving a conversation
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the backend layer
    #[error(transparent)]
    Ai(#[from] canvas_ai::Error),

    /// A turn failed
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// Two capabilities share a name
    #[error("Capability already registered: {0}")]
    DuplicateCapability(String),

    /// A parameter schema failed to compile
    #[error("Invalid parameter schema for '{name}': {message}")]
    InvalidSchema { name: String, message: String },

    /// The conversation was disposed
    #[error("Conversation is closed")]
    Closed,
}

/// Failures that abort a whole turn.
///
/// None of these commit anything to the log; the user retries by sending
/// another message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// Network or stream failure other than cancellation
    #[error("Transport error: {0}")]
    Transport(String),

    /// The first tool-call fragment of a turn carried no call id
    #[error("Tool-call fragment arrived before any call id")]
    MissingCallId,

    /// A tool-call turn finished without opening a single call
    #[error("Tool-call turn finished without any call")]
    EmptyToolCallTurn,

    /// The stream ended before any chunk told text and tool calls apart
    #[error("Stream ended before the turn could be classified")]
    Indeterminate,

    /// The stream ended without a finish reason
    #[error("Stream ended without a finish reason")]
    StreamEnded,
}

impl From<canvas_ai::Error> for TurnError {
    fn from(e: canvas_ai::Error) -> Self {
        TurnError::Transport(e.to_string())
    }
}

/// Failures scoped to a single capability invocation.
///
/// These never abort the turn: they become the content of that call's
/// `tool` message so the model can react.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    /// The argument buffer is not a JSON object
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The arguments do not satisfy the parameter schema
    #[error("{0}")]
    Validation(String),

    /// The handler reported a failure
    #[error("{0}")]
    Handler(String),

    #[error("Capability panicked: {0}")]
    Panicked(String),

    #[error("Capability timed out after {0:?}")]
    TimedOut(Duration),
}

impl CapabilityError {
    /// Create a handler error from any displayable message
    pub fn handler(message: impl Into<String>) -> Self {
        CapabilityError::Handler(message.into())
    }

    /// Error-shaped `tool` message content
    pub fn to_payload(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = CapabilityError::NotFound("draw".into()).to_payload();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["error"], "Capability not found: draw");
    }

    #[test]
    fn test_transport_from_ai_error() {
        let err: TurnError = canvas_ai::Error::Sse("connection reset".into()).into();
        assert_eq!(err, TurnError::Transport("SSE error: connection reset".into()));
    }

    #[test]
    fn test_turn_error_is_transparent() {
        let err: Error = TurnError::MissingCallId.into();
        assert_eq!(err.to_string(), "Tool-call fragment arrived before any call id");
    }

    #[test]
    fn test_timed_out_message() {
        let err = CapabilityError::TimedOut(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Capability timed out after 250ms");
    }
}
