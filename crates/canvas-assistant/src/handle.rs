//! A cloneable handle for driving a conversation from UI code.

use std::sync::Arc;
use std::time::Duration;

use canvas_ai::Message;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::conversation::Shared;
use crate::error::Result;
use crate::events::ChatEvent;

/// A cloneable handle for driving a conversation from UI code.
///
/// All state lives behind one `Arc`, so cloning is cheap.
#[derive(Clone)]
pub struct ConversationHandle {
    pub(crate) shared: Arc<Shared>,
}

impl ConversationHandle {
    /// Append a user message. Returns once appended, not when answered.
    pub fn send_message(&self, text: impl Into<String>) -> Result<()> {
        self.append(Message::user(text))
    }

    /// Append any message, starting a turn if the tail rule allows
    pub fn append(&self, message: Message) -> Result<()> {
        let mut state = self.shared.state.lock();
        let transition = state.append(message)?;
        self.shared.publish(transition, &state);
        Ok(())
    }

    /// Cancel the active turn, if any. The log is left as it is.
    pub fn cancel_stream(&self) {
        self.shared.apply(|state| state.cancel());
    }

    /// Snapshot of the message log
    pub fn messages(&self) -> Vec<Message> {
        self.shared.state.lock().messages().to_vec()
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.state.lock().is_streaming()
    }

    pub fn active_turn_id(&self) -> Option<Uuid> {
        self.shared.state.lock().active_turn_id()
    }

    /// Text streamed so far in the active turn
    pub fn current_partial_text(&self) -> String {
        self.shared.state.lock().partial_text().to_string()
    }

    /// Subscribe to conversation events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    /// Watch the streaming flag
    pub fn watch_streaming(&self) -> watch::Receiver<bool> {
        self.shared.streaming.subscribe()
    }

    /// Wait until no turn is active.
    ///
    /// A tool-call turn hands over to its follow-up without ever reporting
    /// idle in between.
    pub async fn wait_for_idle(&self) {
        let mut streaming = self.shared.streaming.subscribe();
        // Only fails if the sender is gone, which means nothing can stream
        let _ = streaming.wait_for(|active| !*active).await;
    }

    /// Wait until idle, with a timeout.
    /// Returns `true` if idle was reached, `false` on timeout.
    pub async fn wait_for_idle_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }
}

impl std::fmt::Debug for ConversationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ConversationHandle")
            .field("messages", &state.messages().len())
            .field("active_turn", &state.active_turn_id())
            .finish()
    }
}
