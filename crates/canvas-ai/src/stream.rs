//! Streaming chunk types and utilities

use crate::error::Result;
use crate::types::Chunk;
use std::pin::Pin;
use tokio_stream::Stream;

/// A lazy, possibly infinite sequence of chunks for one turn.
///
/// The stream ends after the chunk carrying a finish reason, or early on
/// cancellation. A transport failure is yielded as an `Err` item.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk>> + Send>>;
