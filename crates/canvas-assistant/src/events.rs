//! Conversation event types

use canvas_ai::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEndReason {
    Completed,
    Cancelled,
    Failed,
}

/// Events emitted while a conversation runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was appended to the log
    MessageAppended { index: usize, message: Message },

    /// A turn became active
    TurnStarted { turn_id: Uuid },

    /// Streaming text accumulated so far in the active turn
    PartialText { turn_id: Uuid, text: String },

    ToolExecutionStart { call_id: String, capability: String },

    ToolExecutionEnd {
        call_id: String,
        capability: String,
        is_error: bool,
    },

    /// The active turn ended
    TurnEnded { turn_id: Uuid, outcome: TurnEndReason },

    /// A turn failed; transient, never emitted for cancellation
    Error { message: String },
}

impl ChatEvent {
    /// Check if this event ends a turn
    pub fn is_turn_end(&self) -> bool {
        matches!(self, ChatEvent::TurnEnded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_tags() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ChatEvent::TurnEnded {
            turn_id: id,
            outcome: TurnEndReason::Cancelled,
        })
        .unwrap();
        assert_eq!(json["type"], "turn_ended");
        assert_eq!(json["outcome"], "cancelled");
        assert_eq!(json["turn_id"], id.to_string());

        let json = serde_json::to_value(ChatEvent::PartialText {
            turn_id: id,
            text: "Hel".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "partial_text");
    }

    #[test]
    fn test_is_turn_end() {
        assert!(ChatEvent::TurnEnded {
            turn_id: Uuid::new_v4(),
            outcome: TurnEndReason::Failed
        }
        .is_turn_end());
        assert!(!ChatEvent::Error { message: "x".into() }.is_turn_end());
    }
}
