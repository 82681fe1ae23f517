//! Capability execution for a finished tool-call turn

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use canvas_ai::Message;
use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;

use crate::aggregator::PendingToolCall;
use crate::capability::result_to_content;
use crate::error::CapabilityError;
use crate::registry::CapabilityRegistry;
use crate::turn::TurnObserver;

/// Messages produced by executing one turn's calls
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Assistant message bundling every requested call
    pub assistant_message: Message,
    /// One tool message per call, in request order
    pub tool_messages: Vec<Message>,
}

impl ExecutionOutcome {
    /// Messages in log order
    pub fn into_messages(self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.tool_messages.len() + 1);
        messages.push(self.assistant_message);
        messages.extend(self.tool_messages);
        messages
    }
}

/// Runs aggregated calls against the registry
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<CapabilityRegistry>,
    timeout: Option<Duration>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout: Option<Duration>) -> Self {
        Self { registry, timeout }
    }

    /// Execute every call concurrently, emitting results in request order.
    ///
    /// Failures are scoped to their own call and become error payloads.
    pub async fn execute(
        &self,
        calls: Vec<PendingToolCall>,
        observer: &dyn TurnObserver,
    ) -> ExecutionOutcome {
        let assistant_message =
            Message::assistant_tool_calls(calls.iter().map(PendingToolCall::to_tool_call).collect());

        let runs = calls.iter().map(|call| async move {
            observer.tool_started(call);
            let result = self.invoke(call).await;
            observer.tool_finished(call, result.is_err());

            match result {
                Ok(value) => {
                    tracing::debug!(call_id = %call.call_id, capability = %call.name, "capability succeeded");
                    Message::tool_result(&call.call_id, result_to_content(&value), false)
                }
                Err(e) => {
                    tracing::warn!(
                        call_id = %call.call_id,
                        capability = %call.name,
                        error = %e,
                        "capability failed"
                    );
                    Message::tool_result(&call.call_id, e.to_payload(), true)
                }
            }
        });

        ExecutionOutcome {
            assistant_message,
            tool_messages: join_all(runs).await,
        }
    }

    /// Resolve, parse, validate and run a single call
    pub async fn invoke(&self, call: &PendingToolCall) -> Result<Value, CapabilityError> {
        let capability = self
            .registry
            .get(&call.name)
            .cloned()
            .ok_or_else(|| CapabilityError::NotFound(call.name.clone()))?;

        let arguments = parse_arguments(&call.arguments)?;
        self.registry.validate(&call.name, &arguments)?;

        let run = AssertUnwindSafe(capability.invoke(arguments)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| CapabilityError::TimedOut(limit))?,
            None => run.await,
        };

        outcome.unwrap_or_else(|payload| Err(CapabilityError::Panicked(panic_message(&payload))))
    }
}

/// Parse an argument buffer, treating an empty one as `{}`
fn parse_arguments(buffer: &str) -> Result<Value, CapabilityError> {
    if buffer.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(buffer)
        .map_err(|e| CapabilityError::InvalidArguments(e.to_string()))?;
    if !value.is_object() {
        return Err(CapabilityError::InvalidArguments(
            "expected a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
