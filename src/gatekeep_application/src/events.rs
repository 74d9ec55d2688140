//! Fire-and-forget delivery of domain events.
//!
//! Callers hand events to an [`EventDispatcher`] and return immediately. A
//! background worker publishes them to the configured [`EventSink`] one at a
//! time; a slow or failing sink only ever costs a log line.

use std::{sync::Arc, time::Duration};

use gatekeep_core::EventSink;
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub name: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: mpsc::Sender<DomainEvent>,
}

impl EventDispatcher {
    /// Start the publishing worker. It stops once every dispatcher clone has
    /// been dropped and the queue is drained.
    pub fn spawn<K: EventSink>(
        sink: Arc<K>,
        capacity: usize,
        publish_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<DomainEvent>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match tokio::time::timeout(
                    publish_timeout,
                    sink.publish(&event.name, event.payload),
                )
                .await
                {
                    Ok(Ok(())) => tracing::debug!(event = %event.name, "Event published"),
                    Ok(Err(e)) => {
                        tracing::warn!(event = %event.name, error = %e, "Event publication failed")
                    }
                    Err(_) => tracing::warn!(event = %event.name, "Event publication timed out"),
                }
            }
            tracing::debug!("Event dispatcher stopped");
        });

        (Self { sender }, worker)
    }

    /// Queue an event without waiting for delivery.
    ///
    /// Never fails the caller: a full queue or a stopped worker drops the event
    /// with a warning.
    pub fn dispatch(&self, name: &str, payload: Value) {
        let event = DomainEvent {
            name: name.to_owned(),
            payload,
        };
        if let Err(e) = self.sender.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    tracing::warn!(event = %event.name, "Event queue full, event dropped")
                }
                mpsc::error::TrySendError::Closed(event) => {
                    tracing::warn!(event = %event.name, "Event dispatcher stopped, event dropped")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingSink, RecordingSink, eventually};
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatched_events_reach_the_sink() {
        let sink = RecordingSink::default();
        let (dispatcher, _worker) =
            EventDispatcher::spawn(Arc::new(sink.clone()), 8, DEFAULT_PUBLISH_TIMEOUT);

        dispatcher.dispatch("user.logged_in", json!({ "id": "u-1" }));

        assert!(eventually(|| sink.names() == ["user.logged_in"]).await);
        assert_eq!(sink.events.lock().unwrap()[0].1, json!({ "id": "u-1" }));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_stop_the_worker() {
        let (dispatcher, worker) =
            EventDispatcher::spawn(Arc::new(FailingSink), 8, DEFAULT_PUBLISH_TIMEOUT);

        dispatcher.dispatch("first", json!({}));
        dispatcher.dispatch("second", json!({}));
        drop(dispatcher);

        let finished = tokio::time::timeout(Duration::from_secs(1), worker).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_dispatch_after_worker_stopped_is_silent() {
        let (dispatcher, worker) =
            EventDispatcher::spawn(Arc::new(RecordingSink::default()), 1, DEFAULT_PUBLISH_TIMEOUT);
        worker.abort();
        let _ = worker.await;

        dispatcher.dispatch("late", json!({}));
    }
}
