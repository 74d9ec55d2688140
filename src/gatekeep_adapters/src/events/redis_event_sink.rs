use gatekeep_core::{EventSink, EventSinkError};
use redis::{AsyncCommands, aio::MultiplexedConnection};
use serde_json::Value;

const CHANNEL_PREFIX: &str = "gatekeep.events.";

/// Publishes every event on a Redis pub/sub channel named after the event.
#[derive(Clone)]
pub struct RedisEventSink {
    conn: MultiplexedConnection,
}

impl RedisEventSink {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait::async_trait]
impl EventSink for RedisEventSink {
    #[tracing::instrument(name = "RedisEventSink::publish", skip(self, payload))]
    async fn publish(&self, event_name: &str, payload: Value) -> Result<(), EventSinkError> {
        let message =
            serde_json::to_string(&payload).map_err(|e| EventSinkError::Encoding(e.to_string()))?;

        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(channel(event_name), message)
            .await
            .map_err(|e| EventSinkError::Unavailable(e.to_string()))?;
        tracing::debug!(receivers, "event published");
        Ok(())
    }
}

fn channel(event_name: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, event_name)
}
