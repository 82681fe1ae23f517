//! Scripted backend for testing.
//!
//! [`ScriptedBackend`] replays one queued script per streaming call, so
//! tests can drive a conversation turn by turn without a network. Every
//! call records its [`ChatRequest`] for later assertions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::providers::ChatBackend;
use crate::stream::ChunkStream;
use crate::types::{ChatRequest, Chunk, FinishReason};

/// One step of a scripted turn
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Yield this chunk
    Chunk(Chunk),
    /// Yield a transport error and end the stream
    Error(String),
    /// Sleep before the next step
    Delay(Duration),
    /// Block until the notify fires
    Wait(Arc<Notify>),
    /// Never yield again; only cancellation ends the stream
    Hang,
}

/// What one streaming call does
#[derive(Debug, Clone)]
pub enum Script {
    /// Open successfully and play these steps
    Steps(Vec<ScriptStep>),
    /// Refuse to open the stream
    Reject(String),
}

/// A queue-based fake [`ChatBackend`]
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a turn that plays the given steps
    pub fn with_turn(self, steps: Vec<ScriptStep>) -> Self {
        self.push_turn(steps);
        self
    }

    /// Queue a call that fails to open
    pub fn with_rejection(self, message: impl Into<String>) -> Self {
        self.scripts.lock().push_back(Script::Reject(message.into()));
        self
    }

    pub fn push_turn(&self, steps: Vec<ScriptStep>) {
        self.scripts.lock().push_back(Script::Steps(steps));
    }

    /// Every request received so far, in call order
    pub fn recorded_calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Scripts not yet consumed
    pub fn remaining(&self) -> usize {
        self.scripts.lock().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ChunkStream> {
        self.calls.lock().push(request.clone());

        let script = self.scripts.lock().pop_front();
        let steps = match script {
            Some(Script::Steps(steps)) => steps,
            Some(Script::Reject(message)) => return Err(Error::api("rejected", message)),
            None => {
                return Err(Error::UnexpectedResponse(
                    "no scripted turn left".to_string(),
                ));
            }
        };

        Ok(Box::pin(stream! {
            for step in steps {
                if cancel.is_cancelled() {
                    break;
                }
                match step {
                    ScriptStep::Chunk(chunk) => yield Ok(chunk),
                    ScriptStep::Error(message) => {
                        yield Err(Error::Sse(message));
                        break;
                    }
                    ScriptStep::Delay(duration) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(duration) => {}
                        }
                    }
                    ScriptStep::Wait(notify) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = notify.notified() => {}
                        }
                    }
                    ScriptStep::Hang => {
                        cancel.cancelled().await;
                        break;
                    }
                }
            }
        }))
    }
}

/// Steps for a plain text turn: one chunk per part, then `stop`
pub fn text_turn(turn_id: &str, parts: &[&str]) -> Vec<ScriptStep> {
    let mut steps: Vec<ScriptStep> = parts
        .iter()
        .map(|part| ScriptStep::Chunk(Chunk::text(turn_id, *part)))
        .collect();
    steps.push(ScriptStep::Chunk(Chunk::finish(turn_id, FinishReason::Stop)));
    steps
}

/// Steps for a turn invoking one capability with the given arguments
pub fn tool_turn(turn_id: &str, call_id: &str, name: &str, arguments: &str) -> Vec<ScriptStep> {
    vec![
        ScriptStep::Chunk(Chunk::open_call(turn_id, call_id, name)),
        ScriptStep::Chunk(Chunk::call_arguments(turn_id, arguments)),
        ScriptStep::Chunk(Chunk::finish(turn_id, FinishReason::ToolCalls)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use futures::StreamExt;

    fn request() -> ChatRequest {
        ChatRequest::new(vec![Message::user("hi")], vec![])
    }

    #[tokio::test]
    async fn test_plays_turns_in_order() {
        let backend = ScriptedBackend::new()
            .with_turn(text_turn("t1", &["a"]))
            .with_turn(text_turn("t2", &["b"]));

        let chunks: Vec<_> = backend
            .stream(&request(), CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().text_delta(), Some("a"));
        assert!(chunks[1].as_ref().unwrap().is_terminal());

        let mut second = backend
            .stream(&request(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.next().await.unwrap().unwrap().turn_id, "t2");
        assert_eq!(backend.call_count(), 2);
        assert_eq!(backend.remaining(), 0);
    }

    #[tokio::test]
    async fn test_rejection_and_exhaustion() {
        let backend = ScriptedBackend::new().with_rejection("overloaded");
        assert!(matches!(
            backend.stream(&request(), CancellationToken::new()).await,
            Err(Error::Api { .. })
        ));
        assert!(matches!(
            backend.stream(&request(), CancellationToken::new()).await,
            Err(Error::UnexpectedResponse(_))
        ));
        assert_eq!(backend.recorded_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_hang_ends_on_cancel() {
        let backend = ScriptedBackend::new().with_turn(vec![
            ScriptStep::Chunk(Chunk::text("t1", "partial")),
            ScriptStep::Hang,
        ]);
        let cancel = CancellationToken::new();
        let mut stream = backend.stream(&request(), cancel.clone()).await.unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_step_ends_stream() {
        let backend = ScriptedBackend::new().with_turn(vec![
            ScriptStep::Error("reset".into()),
            ScriptStep::Chunk(Chunk::text("t1", "never")),
        ]);
        let items: Vec<_> = backend
            .stream(&request(), CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Sse(_))));
    }
}
