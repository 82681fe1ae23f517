//! Turn driver: one streaming call from open to sealed messages
//!
//! Chunk handling is a reducer over [`TurnState`], so the whole
//! classification/accumulation logic is testable without a transport.
//! [`TurnDriver`] only adds the stream, cancellation and execution around it.

use std::sync::Arc;

use canvas_ai::{ChatBackend, ChatRequest, Chunk, FinishReason, Message};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{PendingToolCall, ToolCallAggregator};
use crate::classifier::{Classification, classify};
use crate::error::TurnError;
use crate::executor::ToolExecutor;
use crate::registry::CapabilityRegistry;

/// Callbacks for progress inside a turn. All methods default to no-ops.
pub trait TurnObserver: Send + Sync {
    /// Accumulated text after a text chunk
    fn partial_text(&self, _text: &str) {}

    fn tool_started(&self, _call: &PendingToolCall) {}

    fn tool_finished(&self, _call: &PendingToolCall, _is_error: bool) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

/// How a turn ended without failing
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Sealed messages to append, in order
    Completed(Vec<Message>),
    /// Cancellation fired; nothing is appended
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No discriminating chunk yet
    #[default]
    Pending,
    Text,
    ToolCalls,
}

/// Result of a turn whose terminal chunk has been seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    Text(String),
    ToolCalls(Vec<PendingToolCall>),
}

/// What the driver should do after one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    /// Nothing visible changed
    Continue,
    /// The partial text grew
    PartialText,
    /// The terminal chunk arrived
    Complete(TurnResult),
}

/// Accumulator for one turn's chunks
#[derive(Debug, Default)]
pub struct TurnState {
    turn_id: Option<String>,
    phase: TurnPhase,
    text: String,
    aggregator: ToolCallAggregator,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Backend turn id, once a chunk carried one
    pub fn turn_id(&self) -> Option<&str> {
        self.turn_id.as_deref()
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fold one chunk into the state
    pub fn reduce(&mut self, chunk: Chunk) -> Result<Reduction, TurnError> {
        if !chunk.turn_id.is_empty() {
            match &self.turn_id {
                None => self.turn_id = Some(chunk.turn_id.clone()),
                Some(id) if *id != chunk.turn_id => {
                    tracing::warn!(
                        expected = %id,
                        got = %chunk.turn_id,
                        "skipping chunk from another turn"
                    );
                    return Ok(Reduction::Continue);
                }
                Some(_) => {}
            }
        }

        if self.phase == TurnPhase::Pending {
            self.phase = match classify(&chunk) {
                Classification::ToolCall => TurnPhase::ToolCalls,
                Classification::AssistantMessage => TurnPhase::Text,
                Classification::Indeterminate if chunk.is_terminal() => {
                    return Err(TurnError::Indeterminate);
                }
                Classification::Indeterminate => return Ok(Reduction::Continue),
            };
            tracing::debug!(phase = ?self.phase, "classified turn");
        }

        match self.phase {
            TurnPhase::Text => Ok(self.reduce_text(chunk)),
            TurnPhase::ToolCalls => self.reduce_tool_calls(chunk),
            TurnPhase::Pending => Ok(Reduction::Continue),
        }
    }

    fn reduce_text(&mut self, chunk: Chunk) -> Reduction {
        let mut grew = false;
        if let Some(text) = chunk.text_delta() {
            self.text.push_str(text);
            grew = !text.is_empty();
        } else if chunk.tool_call_fragment().is_some() {
            tracing::debug!("ignoring tool-call fragment in a text turn");
        }

        match chunk.finish_reason {
            Some(reason) => {
                if reason != FinishReason::Stop {
                    tracing::debug!(?reason, "text turn finished");
                }
                Reduction::Complete(TurnResult::Text(std::mem::take(&mut self.text)))
            }
            None if grew => Reduction::PartialText,
            None => Reduction::Continue,
        }
    }

    fn reduce_tool_calls(&mut self, chunk: Chunk) -> Result<Reduction, TurnError> {
        if chunk.text_delta().is_some_and(|t| !t.is_empty()) {
            tracing::debug!("ignoring text in a tool-call turn");
        }
        self.aggregator.ingest(&chunk)?;

        let Some(reason) = chunk.finish_reason else {
            return Ok(Reduction::Continue);
        };
        if reason != FinishReason::ToolCalls {
            tracing::warn!(?reason, "tool-call turn ended with an unexpected finish reason");
        }

        let calls = self.aggregator.drain();
        if calls.is_empty() {
            return Err(TurnError::EmptyToolCallTurn);
        }
        Ok(Reduction::Complete(TurnResult::ToolCalls(calls)))
    }

    /// The failure for a stream that ended before its terminal chunk
    pub fn end_of_stream(&self) -> TurnError {
        match self.phase {
            TurnPhase::Pending => TurnError::Indeterminate,
            _ => TurnError::StreamEnded,
        }
    }
}

/// Drives single turns against a backend
#[derive(Clone)]
pub struct TurnDriver {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<CapabilityRegistry>,
    executor: ToolExecutor,
}

impl TurnDriver {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        registry: Arc<CapabilityRegistry>,
        executor: ToolExecutor,
    ) -> Self {
        Self {
            backend,
            registry,
            executor,
        }
    }

    /// Run one turn over the given log.
    ///
    /// Every suspension point races `cancel`; once it fires the turn returns
    /// [`TurnOutcome::Cancelled`] and the stream is dropped.
    pub async fn run_turn(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome, TurnError> {
        let request = ChatRequest::new(messages, self.registry.schemas());

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TurnOutcome::Cancelled),
            opened = self.backend.stream(&request, cancel.clone()) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to open the backend stream");
                return Err(e.into());
            }
        };

        let mut state = TurnState::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(TurnOutcome::Cancelled),
                next = stream.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(_)) | None if cancel.is_cancelled() => return Ok(TurnOutcome::Cancelled),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(state.end_of_stream()),
            };

            match state.reduce(chunk)? {
                Reduction::Continue => {}
                Reduction::PartialText => observer.partial_text(state.text()),
                Reduction::Complete(TurnResult::Text(text)) => {
                    return Ok(TurnOutcome::Completed(vec![Message::assistant(text)]));
                }
                Reduction::Complete(TurnResult::ToolCalls(calls)) => {
                    drop(stream);
                    tracing::info!(calls = calls.len(), "executing capabilities");
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(TurnOutcome::Cancelled),
                        outcome = self.executor.execute(calls, observer) => outcome,
                    };
                    return Ok(TurnOutcome::Completed(outcome.into_messages()));
                }
            }
        }
    }
}
