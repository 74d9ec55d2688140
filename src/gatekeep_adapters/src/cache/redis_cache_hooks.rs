use std::time::Duration;

use gatekeep_core::RepositoryHooks;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use serde_json::Value;

const CACHE_KEY_PREFIX: &str = "gatekeep:cache:";

/// Repository hooks that keep cached documents in Redis.
///
/// Cache failures are logged and swallowed, a miss is indistinguishable from
/// an unreachable server.
#[derive(Clone)]
pub struct RedisCacheHooks {
    conn: MultiplexedConnection,
    default_ttl: Duration,
}

impl RedisCacheHooks {
    pub fn new(conn: MultiplexedConnection, default_ttl: Duration) -> Self {
        Self { conn, default_ttl }
    }
}

#[async_trait::async_trait]
impl RepositoryHooks for RedisCacheHooks {
    #[tracing::instrument(name = "RedisCacheHooks::save_to_cache", skip(self, data))]
    async fn save_to_cache(&self, key: &str, data: &Value, ttl: Option<Duration>) {
        let payload = match serde_json::to_string(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "cache entry could not be encoded");
                return;
            }
        };
        let seconds = ttl.unwrap_or(self.default_ttl).as_secs().max(1);

        let mut conn = self.conn.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(get_key(key), payload, seconds)
            .await
        {
            tracing::warn!(error = %e, "cache write failed");
        }
    }

    #[tracing::instrument(name = "RedisCacheHooks::retrieve_from_cache", skip(self))]
    async fn retrieve_from_cache(&self, key: &str) -> Option<Value> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = match conn.get(get_key(key)).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed");
                return None;
            }
        };

        cached.and_then(|raw| {
            serde_json::from_str(&raw)
                .inspect_err(|e| tracing::warn!(error = %e, "cached entry is not valid json"))
                .ok()
        })
    }
}

fn get_key(key: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, key)
}
