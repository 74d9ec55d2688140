use std::collections::HashMap;

use gatekeep_core::{Filter, LoginRequest, PasswordHasher, Strategy, User};
use secrecy::Secret;

use super::provisioning::LoginError;

const PRIMARY_EMAIL_FIELD: &str = "primaryEmail";

/// Builds the lookup predicate for one strategy.
pub type PredicateBuilder = fn(&LoginRequest) -> Filter;

/// Maps a login request to the predicate that finds its account, and checks
/// what has to hold once the account is found.
pub struct CredentialResolver<P: PasswordHasher> {
    predicates: HashMap<Strategy, PredicateBuilder>,
    hasher: P,
}

impl<P: PasswordHasher> CredentialResolver<P> {
    /// A resolver knowing the password strategy and every identity provider.
    pub fn new(hasher: P) -> Self {
        let mut resolver = Self {
            predicates: HashMap::new(),
            hasher,
        };
        resolver.register(Strategy::Password, primary_email_predicate);
        for strategy in Strategy::ALL.into_iter().filter(Strategy::is_identity_provider) {
            resolver.register(strategy, provider_predicate);
        }
        resolver
    }

    /// Add or replace the predicate for `strategy`.
    pub fn register(&mut self, strategy: Strategy, builder: PredicateBuilder) -> &mut Self {
        self.predicates.insert(strategy, builder);
        self
    }

    /// The predicate for `request`. Unregistered strategies fall back to the
    /// primary-email predicate.
    pub fn resolve(&self, request: &LoginRequest) -> Filter {
        let builder = self
            .predicates
            .get(&request.service)
            .copied()
            .unwrap_or(primary_email_predicate as PredicateBuilder);
        builder(request)
    }

    /// Whether `submitted` matches the stored password digest of `user`.
    ///
    /// Fails closed: a missing digest or a hasher error counts as a mismatch.
    #[tracing::instrument(name = "CredentialResolver::verify_password", skip_all)]
    pub async fn verify_password(&self, user: &User, submitted: &Secret<String>) -> bool {
        let Some(digest) = user.password_hash() else {
            tracing::debug!("Account has no password credential");
            return false;
        };
        match self.hasher.verify(submitted, digest).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(error = %e, "Password verification failed");
                false
            }
        }
    }

    /// The primary email of `user` must exist and be verified.
    pub fn verify_email_gate(&self, user: &User) -> Result<(), LoginError> {
        match user.primary_email_object() {
            None => Err(LoginError::NoPrimaryEmail),
            Some(email) if !email.verified => Err(LoginError::EmailUnverified),
            Some(_) => Ok(()),
        }
    }
}

/// Accounts keyed on `email` through the unique `primaryEmail` field.
///
/// The `emails[].primary` flag is judged after the fetch by
/// [`CredentialResolver::verify_email_gate`], so a record that lost its
/// primary flag is still found and reported as such.
pub fn primary_email_predicate(request: &LoginRequest) -> Filter {
    Filter::eq(PRIMARY_EMAIL_FIELD, request.email.as_str())
}

/// Primary email plus the provider user id linked under the request's
/// service. A request without a provider user id matches nothing.
pub fn provider_predicate(request: &LoginRequest) -> Filter {
    let user_id = request.provider_user_id().unwrap_or_default();
    Filter::and([
        primary_email_predicate(request),
        Filter::eq(
            format!("services.{}.userId", request.service.service_key()),
            user_id,
        ),
    ])
}
