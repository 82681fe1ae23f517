//! canvas-assistant: Streaming chat turn loop with capability execution
//!
//! This crate drives a conversation against a streaming chat-completion
//! backend: it classifies each turn from its first chunks, reassembles
//! fragmented tool-call arguments, executes the requested capabilities and
//! feeds their results back until the backend answers in plain text.

pub mod aggregator;
pub mod capability;
pub mod classifier;
pub mod conversation;
pub mod error;
pub mod events;
pub mod executor;
pub mod handle;
pub mod registry;
pub mod turn;

pub use aggregator::{PendingToolCall, ToolCallAggregator};
pub use capability::{BoxedCapability, Capability, capability_fn};
pub use classifier::{Classification, classify};
pub use conversation::{Conversation, ConversationConfig, ConversationState};
pub use error::{CapabilityError, Error, Result, TurnError};
pub use events::{ChatEvent, TurnEndReason};
pub use executor::{ExecutionOutcome, ToolExecutor};
pub use handle::ConversationHandle;
pub use registry::CapabilityRegistry;
pub use turn::{TurnDriver, TurnObserver, TurnOutcome, TurnState};
