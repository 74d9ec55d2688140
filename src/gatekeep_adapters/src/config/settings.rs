use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use secrecy::Secret;
use serde::Deserialize;

use super::constants::{CONFIG_FILE, defaults, env};

/// Runtime configuration, read from `config/base.json` and `GATEKEEP__*`
/// environment variables. Sections holding secrets are optional so that a
/// deployment only configures the adapters it wires.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatekeepSettings {
    pub database: Option<DatabaseSettings>,
    pub redis: RedisSettings,
    pub authenticator: AuthenticatorSettings,
    pub jwt: Option<JwtSettings>,
    pub repository: RepositorySettings,
    pub events: EventSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host_name: String,
    pub cache_ttl_seconds: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host_name: defaults::REDIS_HOST_NAME.to_owned(),
            cache_ttl_seconds: defaults::CACHE_TTL_SECONDS,
        }
    }
}

impl RedisSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthenticatorSettings {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for AuthenticatorSettings {
    fn default() -> Self {
        Self {
            base_url: defaults::AUTHENTICATOR_BASE_URL.to_owned(),
            timeout_ms: defaults::AUTHENTICATOR_TIMEOUT_MS,
        }
    }
}

impl AuthenticatorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    pub secret: Secret<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    pub operation_timeout_ms: u64,
    pub cursor_batch_size: u64,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: defaults::OPERATION_TIMEOUT_MS,
            cursor_batch_size: defaults::CURSOR_BATCH_SIZE,
        }
    }
}

impl RepositorySettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub capacity: usize,
    pub publish_timeout_ms: u64,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            capacity: defaults::EVENT_CAPACITY,
            publish_timeout_ms: defaults::PUBLISH_TIMEOUT_MS,
        }
    }
}

impl EventSettings {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl GatekeepSettings {
    /// Load `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Settings from a JSON document alone; used to embed configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(json, FileFormat::Json))
            .build()?
            .try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix(env::ENV_PREFIX)
        .prefix_separator(env::ENV_SEPARATOR)
        .separator(env::ENV_SEPARATOR)
        .try_parsing(true)
}

fn default_max_connections() -> u32 {
    defaults::DATABASE_MAX_CONNECTIONS
}

fn default_table() -> String {
    crate::persistence::postgres_document_store::DEFAULT_TABLE.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_empty_document_yields_defaults() {
        let settings = GatekeepSettings::from_json("{}").unwrap();

        assert!(settings.database.is_none());
        assert!(settings.jwt.is_none());
        assert_eq!(settings.redis.host_name, defaults::REDIS_HOST_NAME);
        assert_eq!(settings.repository.operation_timeout(), Duration::from_secs(5));
        assert_eq!(settings.events.capacity, defaults::EVENT_CAPACITY);
        assert_eq!(settings.redis.cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.authenticator.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_sections_override_defaults() {
        let settings = GatekeepSettings::from_json(
            r#"{
                "database": { "url": "postgres://localhost/gatekeep" },
                "jwt": { "secret": "s3cr3t" },
                "repository": { "cursor_batch_size": 10 },
                "redis": { "cache_ttl_seconds": 60 },
                "authenticator": { "base_url": "http://auth.internal/", "timeout_ms": 250 }
            }"#,
        )
        .unwrap();

        let database = settings.database.unwrap();
        assert_eq!(database.url.expose_secret(), "postgres://localhost/gatekeep");
        assert_eq!(database.max_connections, defaults::DATABASE_MAX_CONNECTIONS);
        assert_eq!(database.table, "documents");

        assert_eq!(settings.jwt.unwrap().secret.expose_secret(), "s3cr3t");

        assert_eq!(settings.repository.cursor_batch_size, 10);
        assert_eq!(
            settings.repository.operation_timeout_ms,
            defaults::OPERATION_TIMEOUT_MS
        );
        assert_eq!(settings.redis.cache_ttl(), Duration::from_secs(60));
        assert_eq!(settings.redis.host_name, defaults::REDIS_HOST_NAME);
        assert_eq!(settings.authenticator.base_url, "http://auth.internal/");
        assert_eq!(settings.authenticator.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_secret_does_not_leak_through_debug() {
        let settings =
            GatekeepSettings::from_json(r#"{ "jwt": { "secret": "s3cr3t" } }"#).unwrap();
        assert!(!format!("{settings:?}").contains("s3cr3t"));
    }
}
