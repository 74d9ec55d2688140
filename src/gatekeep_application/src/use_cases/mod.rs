pub mod authorization_guard;
pub mod create_account;
pub mod credential_resolver;
pub mod identity_provider;
pub mod provisioning;
