use gatekeep_core::{IdentityProviderClient, ProviderError, ProviderTokens, User};
use serde_json::Value;
use thiserror::Error;

use super::provisioning::{Provisioner, ProvisioningError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IdentityLoginError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

/// Turns the outcome of a provider's consent flow into a provisioned user.
pub struct IdentityProviderAdapter<P, O>
where
    P: IdentityProviderClient,
    O: Provisioner,
{
    client: P,
    provisioner: O,
}

impl<P, O> IdentityProviderAdapter<P, O>
where
    P: IdentityProviderClient,
    O: Provisioner,
{
    pub fn new(client: P, provisioner: O) -> Self {
        Self {
            client,
            provisioner,
        }
    }

    /// Build the login/create pair from `profile` and hand it to the
    /// provisioner. A profile without an email fails before any lookup.
    #[tracing::instrument(
        name = "IdentityProviderAdapter::authenticate",
        skip_all,
        fields(strategy = %self.client.strategy())
    )]
    pub async fn authenticate(
        &self,
        tokens: ProviderTokens,
        profile: P::Profile,
    ) -> Result<User, IdentityLoginError> {
        let identity = self.client.identity(tokens, profile).inspect_err(|e| {
            tracing::warn!(error = %e, "Provider profile unusable");
        })?;
        Ok(self
            .provisioner
            .login_or_create(&identity.login, identity.create)
            .await?)
    }

    /// Same as [`authenticate`](Self::authenticate) for a raw JSON profile.
    pub async fn authenticate_json(
        &self,
        tokens: ProviderTokens,
        profile: Value,
    ) -> Result<User, IdentityLoginError> {
        let profile = serde_json::from_value(profile)
            .map_err(|e| ProviderError::MalformedProfile(e.to_string()))?;
        self.authenticate(tokens, profile).await
    }
}
