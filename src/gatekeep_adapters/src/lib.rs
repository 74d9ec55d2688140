pub mod authentication;
pub mod cache;
pub mod config;
pub mod events;
pub mod helpers;
pub mod password;
pub mod persistence;
pub mod providers;
pub mod telemetry;

pub use authentication::{
    http_authenticator::HttpAuthenticator,
    jwt_authenticator::{Claims, JwtAuthenticator},
};
pub use cache::redis_cache_hooks::RedisCacheHooks;
pub use config::GatekeepSettings;
pub use events::{redis_event_sink::RedisEventSink, tracing_event_sink::TracingEventSink};
pub use helpers::{
    configure_authenticator, configure_cache, configure_events, configure_jwt,
    configure_postgresql, configure_redis, configure_repository, get_postgres_pool,
    get_redis_client,
};
pub use password::argon2_password_hasher::Argon2PasswordHasher;
pub use persistence::{
    in_memory_document_store::InMemoryDocumentStore,
    postgres_document_store::PostgresDocumentStore,
};
pub use providers::{FacebookClient, GithubClient, GoogleClient};
pub use telemetry::init_tracing;
