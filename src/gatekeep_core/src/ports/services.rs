use async_trait::async_trait;
use secrecy::Secret;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{requests::CreateRequest, user::User};

// AccountCreator port trait and errors
#[derive(Debug, Clone, Error)]
pub enum CreationError {
    #[error("An account already exists for {0}")]
    DuplicateAccount(String),
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("A password is required for the password strategy")]
    MissingPassword,
    #[error("Provider account for {0} carries no provider user id")]
    MissingProviderUserId(String),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Unexpected error {0}")]
    UnexpectedError(String),
}

impl PartialEq for CreationError {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::DuplicateAccount(_), Self::DuplicateAccount(_))
                | (Self::InvalidEmail(_), Self::InvalidEmail(_))
                | (Self::MissingPassword, Self::MissingPassword)
                | (Self::MissingProviderUserId(_), Self::MissingProviderUserId(_))
                | (Self::Hashing(_), Self::Hashing(_))
                | (Self::UnexpectedError(_), Self::UnexpectedError(_))
        )
    }
}

#[async_trait]
pub trait AccountCreator: Send + Sync {
    async fn create(&self, request: CreateRequest) -> Result<User, CreationError>;
}

// PasswordHasher port trait and errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Password hashing error: {0}")]
pub struct HashError(pub String);

/// Opaque password hashing capability.
///
/// `verify` returns `Ok(false)` for a wrong password and an error only when the
/// digest cannot be processed at all.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plain: &Secret<String>) -> Result<String, HashError>;
    async fn verify(&self, plain: &Secret<String>, digest: &str) -> Result<bool, HashError>;
}

// EventSink port trait and errors
#[derive(Debug, Clone, Error)]
pub enum EventSinkError {
    #[error("Event sink unavailable: {0}")]
    Unavailable(String),
    #[error("Event could not be encoded: {0}")]
    Encoding(String),
}

#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn publish(&self, event_name: &str, payload: Value) -> Result<(), EventSinkError>;
}
