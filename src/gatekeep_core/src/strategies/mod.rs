pub mod authenticator;
pub mod identity_provider;
