//! Reassembly of fragmented tool-call arguments

use canvas_ai::{Chunk, ToolCall};

use crate::error::TurnError;

/// One complete invocation request, ready to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    /// Concatenated argument fragments, exactly as streamed
    pub arguments: String,
}

impl PendingToolCall {
    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall::new(&self.call_id, &self.name, &self.arguments)
    }
}

/// Collects fragments into call slots keyed by call id.
///
/// Slots stay in open order. A fragment without a call id always extends
/// the most recently opened slot.
#[derive(Debug, Default)]
pub struct ToolCallAggregator {
    slots: Vec<PendingToolCall>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one chunk's tool-call fragment into its slot.
    ///
    /// Chunks without a fragment are ignored.
    pub fn ingest(&mut self, chunk: &Chunk) -> Result<(), TurnError> {
        let Some(fragment) = chunk.tool_call_fragment() else {
            return Ok(());
        };

        match &fragment.call_id {
            Some(call_id) => {
                // Some backends repeat the id on every fragment of a call
                if let Some(slot) = self.slots.iter_mut().find(|slot| &slot.call_id == call_id) {
                    tracing::debug!(call_id = %call_id, "call id repeated, continuing slot");
                    extend_slot(slot, fragment.name.as_deref(), fragment.arguments.as_deref());
                    return Ok(());
                }
                tracing::debug!(
                    call_id = %call_id,
                    capability = fragment.name.as_deref().unwrap_or(""),
                    "opened tool-call slot"
                );
                self.slots.push(PendingToolCall {
                    call_id: call_id.clone(),
                    name: fragment.name.clone().unwrap_or_default(),
                    arguments: fragment.arguments.clone().unwrap_or_default(),
                });
                Ok(())
            }
            None => {
                let slot = self.slots.last_mut().ok_or(TurnError::MissingCallId)?;
                extend_slot(slot, fragment.name.as_deref(), fragment.arguments.as_deref());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Take every slot in open order, leaving the aggregator empty
    pub fn drain(&mut self) -> Vec<PendingToolCall> {
        std::mem::take(&mut self.slots)
    }
}

fn extend_slot(slot: &mut PendingToolCall, name: Option<&str>, arguments: Option<&str>) {
    if let (true, Some(name)) = (slot.name.is_empty(), name) {
        slot.name.push_str(name);
    }
    if let Some(arguments) = arguments {
        slot.arguments.push_str(arguments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_ai::{Delta, FinishReason, ToolCallFragment};

    fn fragment(call_id: Option<&str>, name: Option<&str>, arguments: Option<&str>) -> Chunk {
        Chunk {
            turn_id: "t".into(),
            delta: Delta::ToolCall(ToolCallFragment {
                call_id: call_id.map(String::from),
                name: name.map(String::from),
                arguments: arguments.map(String::from),
            }),
            finish_reason: None,
        }
    }

    #[test]
    fn test_single_call_concatenates_fragments() {
        let mut agg = ToolCallAggregator::new();
        agg.ingest(&Chunk::open_call("t", "c1", "set_title")).unwrap();
        agg.ingest(&Chunk::call_arguments("t", "{\"title\":")).unwrap();
        agg.ingest(&Chunk::call_arguments("t", "\"Demo\"}")).unwrap();

        let calls = agg.drain();
        assert_eq!(
            calls,
            vec![PendingToolCall {
                call_id: "c1".into(),
                name: "set_title".into(),
                arguments: "{\"title\":\"Demo\"}".into(),
            }]
        );
        assert!(agg.is_empty());
    }

    #[test]
    fn test_multiple_calls_keep_open_order() {
        let mut agg = ToolCallAggregator::new();
        agg.ingest(&Chunk::open_call("t", "c2", "b")).unwrap();
        agg.ingest(&Chunk::call_arguments("t", "{\"x\":")).unwrap();
        agg.ingest(&Chunk::call_arguments("t", "1}")).unwrap();
        agg.ingest(&Chunk::open_call("t", "c1", "a")).unwrap();
        agg.ingest(&Chunk::call_arguments("t", "{}")).unwrap();
        agg.ingest(&Chunk::open_call("t", "c3", "c")).unwrap();

        let calls = agg.drain();
        let ids: Vec<_> = calls.iter().map(|c| c.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1", "c3"]);
        assert_eq!(calls[0].arguments, "{\"x\":1}");
        assert_eq!(calls[1].arguments, "{}");
        assert_eq!(calls[2].arguments, "");
    }

    #[test]
    fn test_opening_fragment_seeds_buffer() {
        let mut agg = ToolCallAggregator::new();
        agg.ingest(&fragment(Some("c1"), Some("sql_chart"), Some("{\"sql\""))).unwrap();
        agg.ingest(&fragment(None, None, Some(":\"select 1\"}"))).unwrap();
        assert_eq!(agg.drain()[0].arguments, "{\"sql\":\"select 1\"}");
    }

    #[test]
    fn test_missing_call_id_on_first_fragment() {
        let mut agg = ToolCallAggregator::new();
        assert_eq!(
            agg.ingest(&Chunk::call_arguments("t", "{}")),
            Err(TurnError::MissingCallId)
        );
    }

    #[test]
    fn test_repeated_call_id_continues_slot() {
        let mut agg = ToolCallAggregator::new();
        agg.ingest(&fragment(Some("c1"), Some("set_title"), Some("{\"ti"))).unwrap();
        agg.ingest(&fragment(Some("c1"), None, Some("tle\":\"x\"}"))).unwrap();
        let calls = agg.drain();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, "{\"title\":\"x\"}");
    }

    #[test]
    fn test_non_fragment_chunks_ignored() {
        let mut agg = ToolCallAggregator::new();
        agg.ingest(&Chunk::text("t", "hello")).unwrap();
        agg.ingest(&Chunk::finish("t", FinishReason::ToolCalls)).unwrap();
        assert!(agg.is_empty());
    }

    #[test]
    fn test_to_tool_call() {
        let call = PendingToolCall {
            call_id: "c1".into(),
            name: "set_title".into(),
            arguments: "{}".into(),
        };
        assert_eq!(call.to_tool_call(), ToolCall::new("c1", "set_title", "{}"));
    }
}
