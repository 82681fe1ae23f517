//! Capability trait and closure-backed capabilities

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::CapabilityError;

/// A client-side function the backend may ask to invoke
#[async_trait]
pub trait Capability: Send + Sync {
    /// Capability name (used in API calls)
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Run the capability with already validated arguments.
    ///
    /// The returned value becomes the `tool` message content.
    async fn invoke(&self, arguments: Value) -> Result<Value, CapabilityError>;
}

/// Type alias for a shared capability
pub type BoxedCapability = Arc<dyn Capability>;

type Handler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, CapabilityError>> + Send + Sync>;

/// A capability backed by an async closure
pub struct FnCapability {
    name: String,
    description: String,
    schema: Value,
    handler: Handler,
}

#[async_trait]
impl Capability for FnCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, CapabilityError> {
        (self.handler)(arguments).await
    }
}

/// Build a capability from an async closure
pub fn capability_fn<F, Fut>(
    name: impl Into<String>,
    description: impl Into<String>,
    schema: Value,
    handler: F,
) -> BoxedCapability
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, CapabilityError>> + Send + 'static,
{
    Arc::new(FnCapability {
        name: name.into(),
        description: description.into(),
        schema,
        handler: Box::new(move |args| Box::pin(handler(args))),
    })
}

/// Render a handler result as `tool` message content.
///
/// Strings go in verbatim; anything else as compact JSON.
pub fn result_to_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
