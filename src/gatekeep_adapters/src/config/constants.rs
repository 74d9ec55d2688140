pub mod env {
    pub const ENV_PREFIX: &str = "GATEKEEP";
    pub const ENV_SEPARATOR: &str = "__";
}

pub const CONFIG_FILE: &str = "config/base";

pub mod defaults {
    pub const DATABASE_MAX_CONNECTIONS: u32 = 5;
    pub const REDIS_HOST_NAME: &str = "127.0.0.1";
    pub const CACHE_TTL_SECONDS: u64 = 300;
    pub const AUTHENTICATOR_BASE_URL: &str = "http://127.0.0.1:3000/";
    pub const AUTHENTICATOR_TIMEOUT_MS: u64 = 5_000;
    pub const OPERATION_TIMEOUT_MS: u64 = 5_000;
    pub const CURSOR_BATCH_SIZE: u64 = 100;
    pub const EVENT_CAPACITY: usize = 1024;
    pub const PUBLISH_TIMEOUT_MS: u64 = 2_000;
}
