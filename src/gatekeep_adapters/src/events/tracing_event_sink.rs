use gatekeep_core::{EventSink, EventSinkError};
use serde_json::Value;

/// Sink that only records events in the trace output.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait::async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event_name: &str, payload: Value) -> Result<(), EventSinkError> {
        tracing::info!(event = event_name, %payload, "domain event");
        Ok(())
    }
}
