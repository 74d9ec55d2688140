use std::sync::Arc;

use async_trait::async_trait;
use gatekeep_core::{
    AccountCreator, CreateRequest, CreationError, DocumentStore, Filter, LoginRequest,
    PasswordHasher, Strategy, Update, User, constants::USER_LOGGED_IN_EVENT,
};
use serde_json::json;
use thiserror::Error;

use super::credential_resolver::CredentialResolver;
use crate::{
    events::EventDispatcher,
    repository::{Repository, RepositoryError},
};

#[derive(Debug, Clone, Error)]
pub enum LoginError {
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid credentials")]
    CredentialsInvalid,
    #[error("Primary email is not verified")]
    EmailUnverified,
    #[error("Account has no primary email")]
    NoPrimaryEmail,
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl PartialEq for LoginError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Repository(a), Self::Repository(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProvisioningError {
    #[error("Account creation failed: {0}")]
    CreationFailed(#[source] CreationError),
    #[error("Login failed after account creation: {0}")]
    LoginAfterCreation(#[source] LoginError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmailVerificationError {
    #[error("Unknown address or wrong verification code")]
    InvalidCode,
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Anything that can turn a login/create pair into a user.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn login_or_create(
        &self,
        login: &LoginRequest,
        create: CreateRequest,
    ) -> Result<User, ProvisioningError>;
}

#[async_trait]
impl<T: Provisioner + ?Sized> Provisioner for Arc<T> {
    async fn login_or_create(
        &self,
        login: &LoginRequest,
        create: CreateRequest,
    ) -> Result<User, ProvisioningError> {
        (**self).login_or_create(login, create).await
    }
}

/// Unifies every login strategy into one login and one login-or-create flow.
pub struct ProvisioningOrchestrator<S, P, A>
where
    S: DocumentStore + 'static,
    P: PasswordHasher,
    A: AccountCreator,
{
    users: Repository<User, S>,
    resolver: CredentialResolver<P>,
    account_creator: A,
    events: EventDispatcher,
}

impl<S, P, A> ProvisioningOrchestrator<S, P, A>
where
    S: DocumentStore + 'static,
    P: PasswordHasher,
    A: AccountCreator,
{
    pub fn new(
        users: Repository<User, S>,
        resolver: CredentialResolver<P>,
        account_creator: A,
        events: EventDispatcher,
    ) -> Self {
        Self {
            users,
            resolver,
            account_creator,
            events,
        }
    }

    /// Find the account behind `request` and check what its strategy
    /// requires. Emits a login event on success.
    #[tracing::instrument(
        name = "ProvisioningOrchestrator::login",
        skip(self, request),
        fields(service = %request.service)
    )]
    pub async fn login(&self, request: &LoginRequest) -> Result<User, LoginError> {
        let filter = self.resolver.resolve(request);
        let user = self.users.find_one(&filter).await.map_err(|e| match e {
            RepositoryError::NotFound => LoginError::UserNotFound,
            other => LoginError::Repository(other),
        })?;

        if request.service == Strategy::Password {
            let submitted = request
                .submitted_password()
                .ok_or(LoginError::CredentialsInvalid)?;
            if !self.resolver.verify_password(&user, submitted).await {
                return Err(LoginError::CredentialsInvalid);
            }
            self.resolver.verify_email_gate(&user)?;
        }

        self.events.dispatch(
            USER_LOGGED_IN_EVENT,
            json!({
                "id": user.metadata.id,
                "email": user.primary_email,
                "service": request.service,
            }),
        );
        tracing::info!("User logged in");
        Ok(user)
    }

    /// Log in, creating the account first when the login fails for any
    /// reason. Creation is attempted at most once and login retried exactly
    /// once, also after a failed creation: a concurrent call may have created
    /// the account in between, and its record is then found by the retry.
    #[tracing::instrument(
        name = "ProvisioningOrchestrator::login_or_create",
        skip(self, login, create),
        fields(service = %login.service)
    )]
    pub async fn login_or_create(
        &self,
        login: &LoginRequest,
        create: CreateRequest,
    ) -> Result<User, ProvisioningError> {
        match self.login(login).await {
            Ok(user) => return Ok(user),
            Err(e) => tracing::info!(reason = %e, "Login failed, provisioning account"),
        }

        let created = self.account_creator.create(create).await;
        let retried = self.login(login).await;

        match (created, retried) {
            (_, Ok(user)) => Ok(user),
            (Err(creation), Err(e)) => {
                tracing::warn!(error = %creation, retry = %e, "Account creation failed");
                Err(ProvisioningError::CreationFailed(creation))
            }
            (Ok(_), Err(e)) => {
                tracing::error!(error = %e, "Login failed right after account creation");
                Err(ProvisioningError::LoginAfterCreation(e))
            }
        }
    }

    /// Confirm ownership of `address` with the code sent at sign-up.
    #[tracing::instrument(name = "ProvisioningOrchestrator::verify_email", skip(self, code))]
    pub async fn verify_email(
        &self,
        address: &str,
        code: &str,
    ) -> Result<User, EmailVerificationError> {
        let pending = Filter::elem_match(
            "emails",
            [
                ("address", json!(address)),
                ("primary", json!(true)),
                ("verificationCode", json!(code)),
            ],
        );
        let mut user = match self.users.find_one(&pending).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound) => return Err(EmailVerificationError::InvalidCode),
            Err(e) => return Err(e.into()),
        };
        let Some(id) = user.metadata.id else {
            return Err(EmailVerificationError::InvalidCode);
        };
        if let Some(email) = user.primary_email_object_mut() {
            email.mark_verified();
        }
        let emails = serde_json::to_value(&user.emails)
            .map_err(|e| RepositoryError::Codec(e.to_string()))?;

        // Re-check the code so a concurrent verification cannot apply twice.
        self.users
            .find_one_and_update(
                &Filter::and([Filter::by_id(id), pending]),
                &Update::new().set("emails", emails),
            )
            .await?
            .ok_or(EmailVerificationError::InvalidCode)
    }

    pub async fn get_user(&self, id: &str) -> Result<User, RepositoryError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    pub fn users(&self) -> &Repository<User, S> {
        &self.users
    }
}

#[async_trait]
impl<S, P, A> Provisioner for ProvisioningOrchestrator<S, P, A>
where
    S: DocumentStore + 'static,
    P: PasswordHasher,
    A: AccountCreator,
{
    async fn login_or_create(
        &self,
        login: &LoginRequest,
        create: CreateRequest,
    ) -> Result<User, ProvisioningError> {
        ProvisioningOrchestrator::login_or_create(self, login, create).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::DEFAULT_PUBLISH_TIMEOUT,
        test_support::{
            CountingCreator, FailingSink, MemoryStore, PhantomCreator, PlainHasher,
            RecordingSink, eventually, user, with_password,
        },
        use_cases::create_account::{RepositoryAccountCreator, user_indexes},
    };
    use fake::{Fake, faker::internet::en::SafeEmail};
    use gatekeep_core::{AuthServices, EmailObject, ProviderCredential};
    use secrecy::Secret;
    use std::{collections::BTreeMap, sync::atomic::Ordering};

    type TestCreator = CountingCreator<RepositoryAccountCreator<MemoryStore, PlainHasher>>;

    struct Harness {
        sink: RecordingSink,
        orchestrator: Arc<ProvisioningOrchestrator<MemoryStore, PlainHasher, TestCreator>>,
    }

    impl Harness {
        async fn new() -> Self {
            let users = Repository::from_shared(Arc::new(MemoryStore::default()));
            for index in user_indexes() {
                users.create_index(&index).await.unwrap();
            }
            let sink = RecordingSink::default();
            let (events, _) =
                EventDispatcher::spawn(Arc::new(sink.clone()), 16, DEFAULT_PUBLISH_TIMEOUT);
            let creator =
                CountingCreator::delegating(RepositoryAccountCreator::new(users.clone(), PlainHasher));
            let orchestrator = Arc::new(ProvisioningOrchestrator::new(
                users,
                CredentialResolver::new(PlainHasher),
                creator,
                events,
            ));
            Self { sink, orchestrator }
        }

        fn creations(&self) -> usize {
            self.orchestrator.account_creator.calls.load(Ordering::SeqCst)
        }

        async fn seed(&self, user: User) -> User {
            self.orchestrator.users().create(user).await.unwrap()
        }
    }

    fn secret(value: &str) -> Secret<String> {
        Secret::new(value.to_owned())
    }

    fn google_user(email: &str, provider_id: &str) -> User {
        let mut services = AuthServices::default();
        services.link_provider(
            Strategy::Google,
            ProviderCredential {
                user_id: provider_id.to_owned(),
                tokens: BTreeMap::new(),
            },
        );
        User {
            services: Some(services),
            ..user(email, true)
        }
    }

    fn google_requests(email: &str, provider_id: &str) -> (LoginRequest, CreateRequest) {
        let login = LoginRequest::provider(Strategy::Google, email, secret("token"), provider_id);
        let create = CreateRequest {
            username: email.split('@').next().unwrap().to_owned(),
            password: None,
            email: email.to_owned(),
            firstname: "Ada".to_owned(),
            lastname: "Lovelace".to_owned(),
            service: Strategy::Google,
            tokens: BTreeMap::from([("userId".to_owned(), provider_id.to_owned())]),
        };
        (login, create)
    }

    #[tokio::test]
    async fn test_password_login_succeeds_and_emits_event() {
        let harness = Harness::new().await;
        let email: String = SafeEmail().fake();
        harness
            .seed(with_password(user(&email, true), "hashed:s3cret"))
            .await;

        let result = harness
            .orchestrator
            .login(&LoginRequest::password(&email, secret("s3cret")))
            .await;

        assert_eq!(result.unwrap().primary_email, email);
        assert!(eventually(|| harness.sink.names() == [USER_LOGGED_IN_EVENT]).await);
    }

    #[tokio::test]
    async fn test_password_login_failure_kinds() {
        let harness = Harness::new().await;
        harness
            .seed(with_password(user("ada@example.com", true), "hashed:s3cret"))
            .await;
        harness
            .seed(with_password(user("bob@example.com", false), "hashed:s3cret"))
            .await;

        let login = |email: &str, password: &str| {
            LoginRequest::password(email.to_owned(), secret(password))
        };
        let orchestrator = &harness.orchestrator;

        assert_eq!(
            orchestrator.login(&login("nobody@example.com", "s3cret")).await,
            Err(LoginError::UserNotFound)
        );
        assert_eq!(
            orchestrator.login(&login("ada@example.com", "wrong")).await,
            Err(LoginError::CredentialsInvalid)
        );
        assert_eq!(
            orchestrator.login(&login("bob@example.com", "s3cret")).await,
            Err(LoginError::EmailUnverified)
        );
        assert!(harness.sink.names().is_empty());
    }

    #[tokio::test]
    async fn test_provider_login_skips_email_gate() {
        let harness = Harness::new().await;
        let mut unverified = google_user("ada@example.com", "g-1");
        unverified.emails[0].verified = false;
        harness.seed(unverified).await;

        let (login, _) = google_requests("ada@example.com", "g-1");
        assert!(harness.orchestrator.login(&login).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_or_create_existing_user_does_not_create() {
        let harness = Harness::new().await;
        harness.seed(google_user("ada@example.com", "g-1")).await;
        let (login, create) = google_requests("ada@example.com", "g-1");

        let first = harness
            .orchestrator
            .login_or_create(&login, create.clone())
            .await
            .unwrap();
        let second = harness
            .orchestrator
            .login_or_create(&login, create)
            .await
            .unwrap();

        assert_eq!(first.metadata.id, second.metadata.id);
        assert_eq!(harness.creations(), 0);
    }

    #[tokio::test]
    async fn test_login_or_create_provisions_new_user_once() {
        let harness = Harness::new().await;
        let (login, create) = google_requests("new@example.com", "g-9");

        let created = harness
            .orchestrator
            .login_or_create(&login, create.clone())
            .await
            .unwrap();
        assert_eq!(created.primary_email, "new@example.com");
        assert_eq!(harness.creations(), 1);

        harness
            .orchestrator
            .login_or_create(&login, create)
            .await
            .unwrap();
        assert_eq!(harness.creations(), 1);
    }

    #[tokio::test]
    async fn test_login_or_create_surfaces_creation_failure() {
        let harness = Harness::new().await;
        // Same address already taken through another provider.
        harness.seed(google_user("ada@example.com", "g-1")).await;
        let (login, create) = google_requests("ada@example.com", "g-other");

        let result = harness.orchestrator.login_or_create(&login, create).await;

        assert!(matches!(
            result,
            Err(ProvisioningError::CreationFailed(CreationError::DuplicateAccount(_)))
        ));
        assert_eq!(harness.creations(), 1);
    }

    #[tokio::test]
    async fn test_login_or_create_surfaces_retry_failure_kind() {
        let store = Arc::new(MemoryStore::default());
        let (events, _) =
            EventDispatcher::spawn(Arc::new(RecordingSink::default()), 4, DEFAULT_PUBLISH_TIMEOUT);
        let orchestrator = ProvisioningOrchestrator::new(
            Repository::from_shared(store),
            CredentialResolver::new(PlainHasher),
            PhantomCreator,
            events,
        );
        let (login, create) = google_requests("ghost@example.com", "g-0");

        let result = orchestrator.login_or_create(&login, create).await;

        assert_eq!(
            result,
            Err(ProvisioningError::LoginAfterCreation(LoginError::UserNotFound))
        );
    }

    #[tokio::test]
    async fn test_race_loser_logs_into_winners_account() {
        let store = Arc::new(MemoryStore::default());
        let users = Repository::from_shared(Arc::clone(&store));
        for index in user_indexes() {
            users.create_index(&index).await.unwrap();
        }
        let (events, _) =
            EventDispatcher::spawn(Arc::new(RecordingSink::default()), 4, DEFAULT_PUBLISH_TIMEOUT);
        // The winner's record is committed, then this call's own insert loses.
        let creator =
            CountingCreator::losing_race(RepositoryAccountCreator::new(users.clone(), PlainHasher));
        let orchestrator = ProvisioningOrchestrator::new(
            users,
            CredentialResolver::new(PlainHasher),
            creator,
            events,
        );
        let (login, create) = google_requests("race@example.com", "g-5");

        let user = orchestrator.login_or_create(&login, create).await.unwrap();

        assert_eq!(user.primary_email, "race@example.com");
        assert_eq!(orchestrator.account_creator.calls.load(Ordering::SeqCst), 1);
        let accounts = orchestrator
            .users()
            .count(&Filter::eq("primaryEmail", "race@example.com"))
            .await;
        assert_eq!(accounts, Ok(1));
        assert!(store.calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_password_login_without_primary_flag_is_reported() {
        let harness = Harness::new().await;
        let mut unflagged = with_password(user("ada@example.com", true), "hashed:s3cret");
        unflagged.emails[0].primary = false;
        harness.seed(unflagged).await;

        let result = harness
            .orchestrator
            .login(&LoginRequest::password("ada@example.com", secret("s3cret")))
            .await;

        assert_eq!(result, Err(LoginError::NoPrimaryEmail));
        assert!(harness.sink.names().is_empty());
    }

    #[tokio::test]
    async fn test_failing_event_sink_does_not_fail_login() {
        let store = Arc::new(MemoryStore::default());
        let users: Repository<User, MemoryStore> = Repository::from_shared(Arc::clone(&store));
        users
            .create(with_password(user("ada@example.com", true), "hashed:pw"))
            .await
            .unwrap();
        let (events, _) = EventDispatcher::spawn(Arc::new(FailingSink), 1, DEFAULT_PUBLISH_TIMEOUT);
        let orchestrator = ProvisioningOrchestrator::new(
            users,
            CredentialResolver::new(PlainHasher),
            PhantomCreator,
            events,
        );

        for _ in 0..5 {
            let result = orchestrator
                .login(&LoginRequest::password("ada@example.com", secret("pw")))
                .await;
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn test_verify_email_flips_flag_once() {
        let harness = Harness::new().await;
        let mut pending = with_password(user("ada@example.com", false), "hashed:pw");
        pending.emails = vec![EmailObject::unverified_primary("ada@example.com")];
        let code = pending.emails[0].verification_code.clone().unwrap();
        harness.seed(pending).await;

        assert_eq!(
            harness
                .orchestrator
                .verify_email("ada@example.com", "000000x")
                .await,
            Err(EmailVerificationError::InvalidCode)
        );

        let verified = harness
            .orchestrator
            .verify_email("ada@example.com", &code)
            .await
            .unwrap();
        let primary = verified.primary_email_object().unwrap();
        assert!(primary.verified);
        assert_eq!(primary.verification_code, None);

        assert_eq!(
            harness
                .orchestrator
                .verify_email("ada@example.com", &code)
                .await,
            Err(EmailVerificationError::InvalidCode)
        );
        assert!(harness
            .orchestrator
            .login(&LoginRequest::password("ada@example.com", secret("pw")))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_get_user() {
        let harness = Harness::new().await;
        let seeded = harness.seed(user("ada@example.com", true)).await;
        let id = seeded.metadata.id.unwrap().to_string();

        assert_eq!(harness.orchestrator.get_user(&id).await, Ok(seeded));
        assert!(matches!(
            harness.orchestrator.get_user("nope").await,
            Err(RepositoryError::InvalidIdentifier(_))
        ));
    }
}
