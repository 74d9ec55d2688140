use async_trait::async_trait;
use gatekeep_core::{
    AccountCreator, AuthServices, CreateRequest, CreationError, DocumentStore, EmailObject,
    IndexSpec, Metadata, PasswordCredential, PasswordHasher, ProviderCredential, Strategy, User,
    constants::tokens,
    domain::user::is_valid_email,
};

use crate::repository::{Repository, RepositoryError};

pub const PRIMARY_EMAIL_INDEX: &str = "users_primary_email_unique";

/// Indexes the user collection needs. The unique primary email index is what
/// turns concurrent creations of one identity into exactly one account.
pub fn user_indexes() -> Vec<IndexSpec> {
    vec![IndexSpec::unique(PRIMARY_EMAIL_INDEX, &["primaryEmail"])]
}

/// `AccountCreator` persisting new users through the user repository.
pub struct RepositoryAccountCreator<S, P>
where
    S: DocumentStore + 'static,
    P: PasswordHasher,
{
    users: Repository<User, S>,
    hasher: P,
}

impl<S, P> RepositoryAccountCreator<S, P>
where
    S: DocumentStore + 'static,
    P: PasswordHasher,
{
    pub fn new(users: Repository<User, S>, hasher: P) -> Self {
        Self { users, hasher }
    }

    async fn build_user(&self, request: CreateRequest) -> Result<User, CreationError> {
        let mut services = AuthServices::default();

        let primary = match request.service {
            Strategy::Password => {
                let password = request.password.as_ref().ok_or(CreationError::MissingPassword)?;
                let hashed = self
                    .hasher
                    .hash(password)
                    .await
                    .map_err(|e| CreationError::Hashing(e.to_string()))?;
                services.password = Some(PasswordCredential { hashed });
                EmailObject::unverified_primary(&request.email)
            }
            provider => {
                let mut tokens = request.tokens;
                let user_id = tokens
                    .remove(tokens::USER_ID)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| CreationError::MissingProviderUserId(request.email.clone()))?;
                // Provider accounts may still set a local password.
                if let Some(password) = &request.password {
                    let hashed = self
                        .hasher
                        .hash(password)
                        .await
                        .map_err(|e| CreationError::Hashing(e.to_string()))?;
                    services.password = Some(PasswordCredential { hashed });
                }
                services.link_provider(provider, ProviderCredential { user_id, tokens });
                EmailObject::verified_primary(&request.email)
            }
        };

        Ok(User {
            metadata: Metadata::default(),
            username: request.username,
            primary_email: request.email,
            firstname: request.firstname,
            lastname: request.lastname,
            emails: vec![primary],
            services: Some(services),
            settings: None,
        })
    }
}

#[async_trait]
impl<S, P> AccountCreator for RepositoryAccountCreator<S, P>
where
    S: DocumentStore + 'static,
    P: PasswordHasher,
{
    #[tracing::instrument(name = "RepositoryAccountCreator::create", skip(self, request), fields(service = %request.service))]
    async fn create(&self, request: CreateRequest) -> Result<User, CreationError> {
        if !is_valid_email(&request.email) {
            return Err(CreationError::InvalidEmail(request.email));
        }
        let email = request.email.clone();
        let user = self.build_user(request).await?;

        self.users.create(user).await.map_err(|e| match e {
            RepositoryError::ConstraintViolation(_) => CreationError::DuplicateAccount(email),
            other => CreationError::UnexpectedError(other.to_string()),
        })
    }
}
