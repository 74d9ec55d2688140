use async_trait::async_trait;
use thiserror::Error;

use crate::domain::principal::Principal;

#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("Credential rejected: {0}")]
    Rejected(String),
    #[error("Authenticator unreachable: {0}")]
    Transport(String),
    #[error("Malformed principal: {0}")]
    Malformed(String),
}

/// Verifies a bearer credential and resolves the principal behind it.
///
/// Implementations are usually remote (the service's own `authenticate`
/// endpoint) but may also verify tokens locally. Either way the caller treats
/// every error as a denial.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Principal, VerificationError>;
}
