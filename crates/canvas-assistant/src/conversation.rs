//! Conversation state machine and the scheduler that runs its turns
//!
//! [`ConversationState`] is a plain value: every operation returns a
//! [`Transition`] describing what was appended, which turn ended and which
//! turn should start. [`Conversation`] owns the state behind a lock,
//! publishes transitions as [`ChatEvent`]s and runs started turns one at a
//! time on a background task.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use canvas_ai::{ChatBackend, Message};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregator::PendingToolCall;
use crate::error::{Error, Result, TurnError};
use crate::events::{ChatEvent, TurnEndReason};
use crate::executor::ToolExecutor;
use crate::handle::ConversationHandle;
use crate::registry::CapabilityRegistry;
use crate::turn::{TurnDriver, TurnObserver, TurnOutcome};

/// Conversation configuration
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Content of the seeded system message
    pub system_prompt: String,
    /// Upper bound for a single capability invocation
    pub tool_timeout: Option<Duration>,
    /// Buffer size of the event channel
    pub event_capacity: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            tool_timeout: None,
            event_capacity: 256,
        }
    }
}

impl ConversationConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }
}

/// A turn that became active and must be run
#[derive(Debug)]
pub struct TurnTicket {
    pub id: Uuid,
    /// Snapshot of the log when the turn started
    pub messages: Vec<Message>,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
struct ActiveTurn {
    id: Uuid,
    cancel: CancellationToken,
}

/// Observable effects of one state operation
#[derive(Debug, Default)]
pub struct Transition {
    /// Appended messages with their log index
    pub appended: Vec<(usize, Message)>,
    pub ended: Option<(Uuid, TurnEndReason)>,
    /// Failure text for a turn that failed
    pub error: Option<String>,
    pub started: Option<TurnTicket>,
}

/// Message log plus single-flight turn bookkeeping
#[derive(Debug)]
pub struct ConversationState {
    messages: Vec<Message>,
    active: Option<ActiveTurn>,
    partial_text: String,
    needs_reevaluation: bool,
    closed: bool,
}

impl ConversationState {
    /// A log seeded with one system message
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            active: None,
            partial_text: String::new(),
            needs_reevaluation: false,
            closed: false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_turn_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|turn| turn.id)
    }

    pub fn partial_text(&self) -> &str {
        &self.partial_text
    }

    pub fn needs_reevaluation(&self) -> bool {
        self.needs_reevaluation
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn is_active(&self, id: Uuid) -> bool {
        self.active_turn_id() == Some(id)
    }

    /// Append a message; starts a turn if idle and the tail awaits a response
    pub fn append(&mut self, message: Message) -> Result<Transition> {
        if self.closed {
            return Err(Error::Closed);
        }
        let mut transition = Transition::default();
        self.messages.push(message.clone());
        transition.appended.push((self.messages.len() - 1, message));

        if self.active.is_some() {
            self.needs_reevaluation = true;
        } else {
            transition.started = self.evaluate();
        }
        Ok(transition)
    }

    /// Start a turn when none is active and the tail is user or tool authored
    pub fn evaluate(&mut self) -> Option<TurnTicket> {
        if self.closed || self.active.is_some() {
            return None;
        }
        self.needs_reevaluation = false;

        let awaits = self
            .messages
            .last()
            .is_some_and(|m| m.role.awaits_response());
        if !awaits {
            return None;
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.active = Some(ActiveTurn {
            id,
            cancel: cancel.clone(),
        });
        Some(TurnTicket {
            id,
            messages: self.messages.clone(),
            cancel,
        })
    }

    /// Publish partial text for the active turn; stale turns are ignored
    pub fn set_partial_text(&mut self, id: Uuid, text: &str) -> bool {
        if !self.is_active(id) {
            return false;
        }
        self.partial_text.clear();
        self.partial_text.push_str(text);
        true
    }

    /// Seal a completed turn's messages into the log
    pub fn commit(&mut self, id: Uuid, messages: Vec<Message>) -> Transition {
        let mut transition = Transition::default();
        if !self.is_active(id) {
            tracing::debug!(turn_id = %id, "discarding result of an inactive turn");
            return transition;
        }
        self.active = None;
        self.partial_text.clear();

        for message in messages {
            self.messages.push(message.clone());
            transition.appended.push((self.messages.len() - 1, message));
        }
        transition.ended = Some((id, TurnEndReason::Completed));
        transition.started = self.evaluate();
        transition
    }

    /// End a failed turn without touching the log
    pub fn fail(&mut self, id: Uuid, error: &TurnError) -> Transition {
        let mut transition = Transition::default();
        if !self.is_active(id) {
            tracing::debug!(turn_id = %id, "ignoring failure of an inactive turn");
            return transition;
        }
        self.active = None;
        self.partial_text.clear();

        transition.error = Some(error.to_string());
        transition.ended = Some((id, TurnEndReason::Failed));
        if self.needs_reevaluation {
            transition.started = self.evaluate();
        }
        transition
    }

    /// Cancel the active turn, leaving the log as it is
    pub fn cancel(&mut self) -> Transition {
        let mut transition = Transition::default();
        if let Some(turn) = self.active.take() {
            turn.cancel.cancel();
            self.partial_text.clear();
            transition.ended = Some((turn.id, TurnEndReason::Cancelled));
        }
        transition
    }

    /// Called once a cancelled turn has actually returned
    pub fn settle(&mut self, id: Uuid) -> Transition {
        let mut transition = if self.is_active(id) {
            self.cancel()
        } else {
            Transition::default()
        };
        if self.active.is_none() && self.needs_reevaluation {
            transition.started = self.evaluate();
        }
        transition
    }

    /// Refuse further messages and cancel the active turn
    pub fn close(&mut self) -> Transition {
        self.closed = true;
        self.needs_reevaluation = false;
        self.cancel()
    }
}

/// State shared between handles and the scheduler
pub(crate) struct Shared {
    pub(crate) state: Mutex<ConversationState>,
    pub(crate) events: broadcast::Sender<ChatEvent>,
    pub(crate) streaming: watch::Sender<bool>,
    tickets: mpsc::UnboundedSender<TurnTicket>,
}

impl Shared {
    /// Run one state operation and publish its effects
    pub(crate) fn apply(&self, op: impl FnOnce(&mut ConversationState) -> Transition) {
        let mut state = self.state.lock();
        let transition = op(&mut state);
        self.publish(transition, &state);
    }

    /// Publish a transition. Called with the state lock held so events keep
    /// the order of the operations that caused them.
    pub(crate) fn publish(&self, transition: Transition, state: &ConversationState) {
        for (index, message) in transition.appended {
            self.emit(ChatEvent::MessageAppended { index, message });
        }
        if let Some(message) = transition.error {
            self.emit(ChatEvent::Error { message });
        }
        if let Some((turn_id, outcome)) = transition.ended {
            tracing::info!(turn_id = %turn_id, ?outcome, "turn ended");
            self.emit(ChatEvent::TurnEnded { turn_id, outcome });
        }
        if let Some(ticket) = transition.started {
            let turn_id = ticket.id;
            tracing::info!(turn_id = %turn_id, messages = ticket.messages.len(), "turn started");
            self.emit(ChatEvent::TurnStarted { turn_id });
            if self.tickets.send(ticket).is_err() {
                tracing::warn!(turn_id = %turn_id, "scheduler stopped, turn will not run");
            }
        }

        let streaming = state.is_streaming();
        self.streaming.send_if_modified(|current| {
            let changed = *current != streaming;
            *current = streaming;
            changed
        });
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Routes driver progress into events for one turn
struct TicketObserver<'a> {
    shared: &'a Shared,
    turn_id: Uuid,
}

impl TurnObserver for TicketObserver<'_> {
    fn partial_text(&self, text: &str) {
        let mut state = self.shared.state.lock();
        if state.set_partial_text(self.turn_id, text) {
            self.shared.emit(ChatEvent::PartialText {
                turn_id: self.turn_id,
                text: text.to_string(),
            });
        }
    }

    fn tool_started(&self, call: &PendingToolCall) {
        let state = self.shared.state.lock();
        if state.is_active(self.turn_id) {
            self.shared.emit(ChatEvent::ToolExecutionStart {
                call_id: call.call_id.clone(),
                capability: call.name.clone(),
            });
        }
    }

    fn tool_finished(&self, call: &PendingToolCall, is_error: bool) {
        let state = self.shared.state.lock();
        if state.is_active(self.turn_id) {
            self.shared.emit(ChatEvent::ToolExecutionEnd {
                call_id: call.call_id.clone(),
                capability: call.name.clone(),
                is_error,
            });
        }
    }
}

/// Run tickets one after another for the life of the conversation
async fn run_scheduler(
    shared: Arc<Shared>,
    driver: TurnDriver,
    mut tickets: mpsc::UnboundedReceiver<TurnTicket>,
) {
    while let Some(TurnTicket {
        id,
        messages,
        cancel,
    }) = tickets.recv().await
    {
        let observer = TicketObserver {
            shared: &shared,
            turn_id: id,
        };
        match driver.run_turn(messages, cancel, &observer).await {
            Ok(TurnOutcome::Completed(messages)) => {
                tracing::debug!(turn_id = %id, appended = messages.len(), "turn completed");
                shared.apply(|state| state.commit(id, messages));
            }
            Ok(TurnOutcome::Cancelled) => {
                tracing::debug!(turn_id = %id, "cancelled turn returned");
                shared.apply(|state| state.settle(id));
            }
            Err(e) => {
                tracing::error!(turn_id = %id, error = %e, "turn failed");
                shared.apply(|state| state.fail(id, &e));
            }
        }
    }
}

/// Owner of one conversation.
///
/// Dropping it (or calling [`dispose`](Self::dispose)) cancels any active
/// turn and stops the scheduler. Derefs to its [`ConversationHandle`].
pub struct Conversation {
    handle: ConversationHandle,
    scheduler: Option<JoinHandle<()>>,
}

impl Conversation {
    /// Create a conversation seeded with the system prompt.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: ConversationConfig,
        backend: Arc<dyn ChatBackend>,
        registry: CapabilityRegistry,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (streaming, _) = watch::channel(false);
        let (tickets, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: Mutex::new(ConversationState::new(config.system_prompt)),
            events,
            streaming,
            tickets,
        });

        let registry = Arc::new(registry);
        let executor = ToolExecutor::new(registry.clone(), config.tool_timeout);
        let driver = TurnDriver::new(backend, registry, executor);
        let scheduler = tokio::spawn(run_scheduler(shared.clone(), driver, rx));

        Self {
            handle: ConversationHandle { shared },
            scheduler: Some(scheduler),
        }
    }

    /// A cloneable handle for UI code
    pub fn handle(&self) -> ConversationHandle {
        self.handle.clone()
    }

    /// Cancel any active turn and stop the scheduler
    pub fn dispose(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            self.handle.shared.apply(|state| state.close());
            scheduler.abort();
        }
    }
}

impl Deref for Conversation {
    type Target = ConversationHandle;

    fn deref(&self) -> &ConversationHandle {
        &self.handle
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.dispose();
    }
}
