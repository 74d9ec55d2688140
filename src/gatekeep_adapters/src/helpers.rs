use std::sync::Arc;

use gatekeep_application::{EventDispatcher, Repository};
use gatekeep_core::{DocumentStore, Entity, EventSink, VerificationError};
use redis::{Client, RedisResult, aio::MultiplexedConnection};
use secrecy::ExposeSecret;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::task::JoinHandle;

use crate::{
    authentication::{http_authenticator::HttpAuthenticator, jwt_authenticator::JwtAuthenticator},
    cache::redis_cache_hooks::RedisCacheHooks,
    config::{
        AuthenticatorSettings, DatabaseSettings, EventSettings, JwtSettings, RedisSettings,
        RepositorySettings,
    },
    persistence::postgres_document_store::PostgresDocumentStore,
};

/// Create a PostgreSQL connection pool
pub async fn get_postgres_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

/// Create a Redis client
pub fn get_redis_client(redis_hostname: &str) -> RedisResult<Client> {
    let redis_url = format!("redis://{}/", redis_hostname);
    redis::Client::open(redis_url)
}

/// Connect to PostgreSQL and make sure the document table exists.
pub async fn configure_postgresql(
    settings: &DatabaseSettings,
) -> color_eyre::eyre::Result<PostgresDocumentStore> {
    let pool = get_postgres_pool(settings.url.expose_secret(), settings.max_connections).await?;
    let store = PostgresDocumentStore::with_table(pool, &settings.table)?;
    store.ensure_table().await?;
    Ok(store)
}

/// Open the multiplexed Redis connection shared by the cache hooks and the
/// event sink. Clones of it pipeline over the same socket.
pub async fn configure_redis(settings: &RedisSettings) -> RedisResult<MultiplexedConnection> {
    get_redis_client(&settings.host_name)?
        .get_multiplexed_async_connection()
        .await
}

/// Repository cache hooks expiring entries after the configured ttl.
pub fn configure_cache(conn: MultiplexedConnection, settings: &RedisSettings) -> RedisCacheHooks {
    RedisCacheHooks::new(conn, settings.cache_ttl())
}

/// Remote authenticator bounded by the configured timeout.
pub fn configure_authenticator(
    settings: &AuthenticatorSettings,
) -> Result<HttpAuthenticator, VerificationError> {
    HttpAuthenticator::with_timeout(&settings.base_url, settings.timeout())
}

/// Local access token verifier.
pub fn configure_jwt(settings: &JwtSettings) -> JwtAuthenticator {
    JwtAuthenticator::new(settings.secret.clone())
}

/// Repository over `store` using the configured timeout and batch size.
pub fn configure_repository<E, S>(store: Arc<S>, settings: &RepositorySettings) -> Repository<E, S>
where
    E: Entity + serde::Serialize + serde::de::DeserializeOwned,
    S: DocumentStore + 'static,
{
    Repository::from_shared(store)
        .with_timeout(settings.operation_timeout())
        .with_cursor_batch_size(settings.cursor_batch_size)
}

/// Start the event worker for `sink`.
pub fn configure_events<K: EventSink>(
    sink: Arc<K>,
    settings: &EventSettings,
) -> (EventDispatcher, JoinHandle<()>) {
    EventDispatcher::spawn(sink, settings.capacity, settings.publish_timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::tracing_event_sink::TracingEventSink,
        persistence::in_memory_document_store::InMemoryDocumentStore,
    };
    use gatekeep_core::{Authenticator, Filter, User};
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_redis_client_url() {
        assert!(get_redis_client("cache.internal:6380").is_ok());
    }

    #[tokio::test]
    async fn test_configured_authenticator_uses_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u-1",
                "email": "ada@example.com",
                "roles": [],
                "created": 0,
                "expires": 0,
            })))
            .expect(1)
            .mount(&server)
            .await;
        let settings = AuthenticatorSettings {
            base_url: format!("{}/", server.uri()),
            timeout_ms: 1_000,
        };

        let principal = configure_authenticator(&settings)
            .unwrap()
            .verify("token")
            .await
            .unwrap();

        assert_eq!(principal.id, "u-1");
    }

    #[test]
    fn test_configured_authenticator_rejects_bad_url() {
        let settings = AuthenticatorSettings {
            base_url: "not a url".to_owned(),
            timeout_ms: 50,
        };
        assert!(configure_authenticator(&settings).is_err());
    }

    #[tokio::test]
    async fn test_configured_jwt_rejects_garbage() {
        let jwt = configure_jwt(&JwtSettings {
            secret: Secret::new("s3cr3t".to_owned()),
        });
        assert!(jwt.verify("not.a.token").await.is_err());
    }

    #[tokio::test]
    async fn test_configured_repository_reaches_store() {
        let repository: Repository<User, _> = configure_repository(
            Arc::new(InMemoryDocumentStore::new()),
            &RepositorySettings::default(),
        );
        assert_eq!(repository.count(&Filter::All).await, Ok(0));
    }

    #[tokio::test]
    async fn test_configured_events_accept_dispatch() {
        let (dispatcher, _worker) =
            configure_events(Arc::new(TracingEventSink), &EventSettings::default());
        dispatcher.dispatch("user.logged_in", serde_json::json!({ "id": "u-1" }));
    }
}
