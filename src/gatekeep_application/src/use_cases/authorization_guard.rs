use std::time::Duration;

use gatekeep_core::{Authenticator, CallContext, HandlerMetadata, Principal};
use thiserror::Error;

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a guard evaluation. Denials carry no reason; the reason is
/// logged where it is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub(crate) enum GuardError {
    #[error("No credential on the call")]
    MissingCredential,
    #[error("Credential verification failed: {0}")]
    VerificationError(String),
    #[error("Missing roles: {missing:?}")]
    InsufficientRole { missing: Vec<String> },
    #[error("Credential verification timed out")]
    Timeout,
}

/// Decides whether a call may proceed, the same way for every transport.
pub struct AuthorizationGuard<A: Authenticator> {
    authenticator: A,
    timeout: Duration,
}

impl<A: Authenticator> AuthorizationGuard<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    /// Upper bound for the authenticator round trip. Hitting it denies.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extract the credential from `context`, verify it, check the roles
    /// required by `metadata` and attach the principal on success.
    ///
    /// Fails closed: every error path ends in `Decision::Deny`.
    #[tracing::instrument(
        name = "AuthorizationGuard::can_activate",
        skip_all,
        fields(transport = ?context.transport())
    )]
    pub async fn can_activate<C: CallContext>(
        &self,
        context: &mut C,
        metadata: &HandlerMetadata,
    ) -> Decision {
        let credential = context.credential().map(str::to_owned);

        match self.authorize(credential, metadata.roles()).await {
            Ok(principal) => {
                tracing::debug!(principal = %principal.id, "Call authorized");
                context.attach_principal(principal);
                Decision::Allow
            }
            Err(reason) => {
                tracing::warn!(%reason, "Call denied");
                Decision::Deny
            }
        }
    }

    pub(crate) async fn authorize(
        &self,
        credential: Option<String>,
        required_roles: &[String],
    ) -> Result<Principal, GuardError> {
        let credential = credential.ok_or(GuardError::MissingCredential)?;

        let principal = tokio::time::timeout(self.timeout, self.authenticator.verify(&credential))
            .await
            .map_err(|_| GuardError::Timeout)?
            .map_err(|e| GuardError::VerificationError(e.to_string()))?;

        let missing = principal.missing_roles(required_roles);
        if !missing.is_empty() {
            return Err(GuardError::InsufficientRole {
                missing: missing.into_iter().map(str::to_owned).collect(),
            });
        }
        Ok(principal)
    }
}
