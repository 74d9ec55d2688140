//! Shared doubles for the use case tests.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use gatekeep_core::{
    AccountCreator, Authenticator, CreateRequest, CreationError, DocumentStore, EmailObject,
    EventSink, EventSinkError, Filter, FindOptions, HashError, IndexSpec, Metadata,
    PasswordCredential, PasswordHasher, Principal, StoreError, Update, User, VerificationError,
    query::{document_id, lookup},
};
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;

/// A user with one primary email and no services.
pub fn user(email: &str, verified: bool) -> User {
    let mut primary = EmailObject::verified_primary(email);
    primary.verified = verified;
    User {
        metadata: Metadata::default(),
        username: email.split('@').next().unwrap().to_owned(),
        primary_email: email.to_owned(),
        firstname: "Ada".to_owned(),
        lastname: "Lovelace".to_owned(),
        emails: vec![primary],
        services: None,
        settings: None,
    }
}

pub fn with_password(mut user: User, hashed: &str) -> User {
    user.services.get_or_insert_with(Default::default).password = Some(PasswordCredential {
        hashed: hashed.to_owned(),
    });
    user
}

/// In-memory store counting every call it receives.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Vec<Value>>>,
    unique_indexes: Mutex<Vec<(String, IndexSpec)>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl MemoryStore {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_unique(&self, collection: &str, existing: &[Value], candidate: &Value) -> Result<(), StoreError> {
        let indexes = self.unique_indexes.lock().unwrap();
        for (_, index) in indexes.iter().filter(|(owner, _)| owner == collection) {
            let key: Vec<_> = index.fields.iter().map(|f| lookup(candidate, f)).collect();
            let clash = existing.iter().any(|document| {
                document_id(document) != document_id(candidate)
                    && index.fields.iter().map(|f| lookup(document, f)).collect::<Vec<_>>() == key
            });
            if clash {
                return Err(StoreError::Duplicate {
                    index: index.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn sorted(documents: &mut [Value]) {
        documents.sort_by_key(document_id);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError> {
        self.insert_many(collection, vec![document])
            .await
            .map(|mut documents| documents.remove(0))
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        self.enter().await;
        let mut collections = self.collections.lock().unwrap();
        let stored = collections.entry(collection.to_owned()).or_default();
        let mut staged = stored.clone();
        for document in &documents {
            self.check_unique(collection, &staged, document)?;
            staged.push(document.clone());
        }
        Self::sorted(&mut staged);
        *stored = staged;
        Ok(documents)
    }

    async fn find(&self, collection: &str, filter: &Filter, options: FindOptions) -> Result<Vec<Value>, StoreError> {
        self.enter().await;
        let collections = self.collections.lock().unwrap();
        let matching = collections
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|document| filter.matches(document))
            .skip(options.skip as usize)
            .take(options.limit.map_or(usize::MAX, |limit| limit as usize))
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> Result<Option<Value>, StoreError> {
        self.enter().await;
        let mut collections = self.collections.lock().unwrap();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(document) = documents.iter_mut().find(|document| filter.matches(document)) else {
            return Ok(None);
        };
        update.apply(document);
        Ok(Some(document.clone()))
    }

    async fn update_many(&self, collection: &str, filter: &Filter, update: &Update) -> Result<Vec<Value>, StoreError> {
        self.enter().await;
        let mut collections = self.collections.lock().unwrap();
        let mut updated = Vec::new();
        for document in collections.entry(collection.to_owned()).or_default().iter_mut() {
            if filter.matches(document) {
                update.apply(document);
                updated.push(document.clone());
            }
        }
        Ok(updated)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        self.enter().await;
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_owned()).or_default();
        match documents.iter().position(|document| filter.matches(document)) {
            Some(position) => {
                documents.remove(position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.enter().await;
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_owned()).or_default();
        let before = documents.len();
        documents.retain(|document| !filter.matches(document));
        Ok((before - documents.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.enter().await;
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|document| filter.matches(document))
            .count() as u64)
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        self.enter().await;
        if index.unique {
            self.unique_indexes
                .lock()
                .unwrap()
                .push((collection.to_owned(), index.clone()));
        }
        Ok(())
    }
}

/// Reversible "hash" so tests can reason about stored digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHasher;

#[async_trait]
impl PasswordHasher for PlainHasher {
    async fn hash(&self, plain: &Secret<String>) -> Result<String, HashError> {
        Ok(format!("hashed:{}", plain.expose_secret()))
    }

    async fn verify(&self, plain: &Secret<String>, digest: &str) -> Result<bool, HashError> {
        Ok(digest == format!("hashed:{}", plain.expose_secret()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenHasher;

#[async_trait]
impl PasswordHasher for BrokenHasher {
    async fn hash(&self, _plain: &Secret<String>) -> Result<String, HashError> {
        Err(HashError("broken".to_owned()))
    }

    async fn verify(&self, _plain: &Secret<String>, _digest: &str) -> Result<bool, HashError> {
        Err(HashError("broken".to_owned()))
    }
}

/// Account creator that counts calls and delegates.
///
/// In `losing_race` mode the delegate's record is committed but the call
/// still reports `DuplicateAccount`, as seen by the loser of two concurrent
/// creations.
pub struct CountingCreator<A> {
    inner: A,
    lose_race: bool,
    pub calls: AtomicUsize,
}

impl<A> CountingCreator<A> {
    pub fn delegating(inner: A) -> Self {
        Self {
            inner,
            lose_race: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn losing_race(inner: A) -> Self {
        Self {
            lose_race: true,
            ..Self::delegating(inner)
        }
    }
}

#[async_trait]
impl<A: AccountCreator> AccountCreator for CountingCreator<A> {
    async fn create(&self, request: CreateRequest) -> Result<User, CreationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let email = request.email.clone();
        let created = self.inner.create(request).await?;
        if self.lose_race {
            return Err(CreationError::DuplicateAccount(email));
        }
        Ok(created)
    }
}

/// Creator that reports success without persisting anything.
pub struct PhantomCreator;

#[async_trait]
impl AccountCreator for PhantomCreator {
    async fn create(&self, request: CreateRequest) -> Result<User, CreationError> {
        Ok(user(&request.email, true))
    }
}

/// Authenticator accepting exactly one credential.
pub struct StaticAuthenticator {
    credential: String,
    principal: Principal,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StaticAuthenticator {
    pub fn new(credential: &str, roles: &[&str]) -> Self {
        Self {
            credential: credential.to_owned(),
            principal: Principal {
                id: "u-1".to_owned(),
                email: "ada@example.com".to_owned(),
                roles: roles.iter().map(|role| (*role).to_owned()).collect(),
                created: 1_700_000_000,
                expires: 1_700_003_600,
            },
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn principal(&self) -> Principal {
        self.principal.clone()
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn verify(&self, credential: &str) -> Result<Principal, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if credential == self.credential {
            Ok(self.principal.clone())
        } else {
            Err(VerificationError::Rejected("unknown credential".to_owned()))
        }
    }
}

/// Event sink remembering every published event.
#[derive(Default, Clone)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingSink {
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event_name: &str, payload: Value) -> Result<(), EventSinkError> {
        self.events
            .lock()
            .unwrap()
            .push((event_name.to_owned(), payload));
        Ok(())
    }
}

pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn publish(&self, _event_name: &str, _payload: Value) -> Result<(), EventSinkError> {
        Err(EventSinkError::Unavailable("sink down".to_owned()))
    }
}

/// Poll until `condition` holds or a second has passed.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
