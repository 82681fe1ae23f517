//! Chat-completion backend implementations

pub mod openai;

use crate::{ChatRequest, ChunkStream, Error, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Trait for streaming chat-completion backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open one streaming call for the given log and capability list.
    ///
    /// The returned stream must stop yielding once `cancel` fires.
    async fn stream(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ChunkStream>;
}

/// Read a required setting from the environment
pub fn required_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::InvalidConfig(format!(
            "{} environment variable is not set",
            var
        ))),
    }
}
