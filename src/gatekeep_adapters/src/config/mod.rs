pub mod constants;
pub mod settings;

pub use settings::{
    AuthenticatorSettings, DatabaseSettings, EventSettings, GatekeepSettings, JwtSettings,
    RedisSettings, RepositorySettings,
};
