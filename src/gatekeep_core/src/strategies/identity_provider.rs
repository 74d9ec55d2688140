use std::collections::BTreeMap;

use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    constants::tokens as token_names,
    domain::{
        requests::{CreateRequest, LoginRequest},
        strategy::Strategy,
    },
};

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Identity provider returned no usable identity")]
    NoUsableIdentity,
    #[error("Malformed provider profile: {0}")]
    MalformedProfile(String),
}

impl PartialEq for ProviderError {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::NoUsableIdentity, Self::NoUsableIdentity)
                | (Self::MalformedProfile(_), Self::MalformedProfile(_))
        )
    }
}

/// Tokens handed out by a provider at the end of its own consent flow.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
}

impl ProviderTokens {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: None,
        }
    }
}

/// Provider-independent view of a profile payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedProfile {
    pub user_id: String,
    pub email: String,
    pub username: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

/// The login/create pair derived from one provider contact.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub login: LoginRequest,
    pub create: CreateRequest,
}

impl ProviderIdentity {
    pub fn new(strategy: Strategy, tokens: ProviderTokens, profile: NormalizedProfile) -> Self {
        let mut token_map = BTreeMap::from([
            (
                token_names::ACCESS_TOKEN.to_owned(),
                tokens.access_token.expose_secret().clone(),
            ),
            (token_names::USER_ID.to_owned(), profile.user_id.clone()),
        ]);
        if let Some(refresh_token) = &tokens.refresh_token {
            token_map.insert(
                token_names::REFRESH_TOKEN.to_owned(),
                refresh_token.expose_secret().clone(),
            );
        }

        let username = profile
            .username
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| local_part(&profile.email).to_owned());

        let login = LoginRequest::provider(
            strategy,
            profile.email.clone(),
            tokens.access_token,
            profile.user_id,
        );

        let create = CreateRequest {
            username,
            password: None,
            email: profile.email,
            firstname: profile.firstname.unwrap_or_default(),
            lastname: profile.lastname.unwrap_or_default(),
            service: strategy,
            tokens: token_map,
        };

        Self { login, create }
    }
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Turns one provider's profile payload into a login/create pair.
///
/// Implementations must fail with `ProviderError::NoUsableIdentity` when the
/// profile carries no email address, before any request is built.
pub trait IdentityProviderClient: Send + Sync {
    type Profile: DeserializeOwned + Send;

    fn strategy(&self) -> Strategy;

    fn normalize(&self, profile: Self::Profile) -> Result<NormalizedProfile, ProviderError>;

    fn identity(
        &self,
        tokens: ProviderTokens,
        profile: Self::Profile,
    ) -> Result<ProviderIdentity, ProviderError> {
        let normalized = self.normalize(profile)?;
        if normalized.email.is_empty() || normalized.user_id.is_empty() {
            return Err(ProviderError::NoUsableIdentity);
        }
        Ok(ProviderIdentity::new(self.strategy(), tokens, normalized))
    }
}
