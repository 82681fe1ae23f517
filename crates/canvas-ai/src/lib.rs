//! canvas-ai: Streaming chat-completion backend abstraction
//!
//! This crate defines the conversation vocabulary shared with chat-completion
//! backends (messages, streamed chunks, capability schemas) and the transport
//! that turns an OpenAI-compatible server-sent-events response into chunks.

pub mod error;
pub mod mock;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::ChatBackend;
pub use stream::ChunkStream;
pub use types::*;
