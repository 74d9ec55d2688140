//! Generic repository over a document store.
//!
//! A `Repository` is composed per entity type from a store handle, an entity
//! codec and optional hooks. Every operation runs under the configured
//! timeout, translates store failures into [`RepositoryError`] and logs the
//! failure (operation name, and the filter for queries) before returning it.

use std::{future::Future, marker::PhantomData, pin::Pin, sync::Arc, time::Duration};

use chrono::Utc;
use futures::{Stream, TryStreamExt, stream};
use gatekeep_core::{
    CodecError, DocumentId, DocumentStore, Entity, EntityCodec, Filter, FindOptions, IndexSpec,
    InvalidDocumentId, JsonCodec, NoHooks, RepositoryHooks, StoreError, Update,
};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CURSOR_BATCH_SIZE: u64 = 100;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Document not found")]
    NotFound,
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Transient store error: {0}")]
    TransientStoreError(String),
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<StoreError> for RepositoryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate { index } => {
                RepositoryError::ConstraintViolation(format!("unique index {index}"))
            }
            StoreError::Unavailable(message) => RepositoryError::TransientStoreError(message),
            StoreError::Malformed(message) => RepositoryError::Codec(message),
        }
    }
}

impl From<CodecError> for RepositoryError {
    fn from(error: CodecError) -> Self {
        RepositoryError::Codec(error.0)
    }
}

impl From<InvalidDocumentId> for RepositoryError {
    fn from(error: InvalidDocumentId) -> Self {
        RepositoryError::InvalidIdentifier(error.0)
    }
}

/// Lazily fetched sequence of entities.
pub type EntityStream<E> = Pin<Box<dyn Stream<Item = Result<E, RepositoryError>> + Send>>;

pub struct Repository<E, S, C = JsonCodec> {
    store: Arc<S>,
    codec: Arc<C>,
    hooks: Arc<dyn RepositoryHooks>,
    timeout: Duration,
    cursor_batch_size: u64,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S, C> Clone for Repository<E, S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            codec: Arc::clone(&self.codec),
            hooks: Arc::clone(&self.hooks),
            timeout: self.timeout,
            cursor_batch_size: self.cursor_batch_size,
            _entity: PhantomData,
        }
    }
}

impl<E, S> Repository<E, S, JsonCodec>
where
    E: Entity,
    S: DocumentStore,
{
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Build a repository on a store handle shared with other repositories.
    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            codec: Arc::new(JsonCodec),
            hooks: Arc::new(NoHooks),
            timeout: DEFAULT_OPERATION_TIMEOUT,
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            _entity: PhantomData,
        }
    }
}

impl<E, S, C> Repository<E, S, C>
where
    E: Entity,
    S: DocumentStore + 'static,
    C: EntityCodec<E> + 'static,
{
    pub fn with_codec<C2: EntityCodec<E>>(self, codec: C2) -> Repository<E, S, C2> {
        Repository {
            store: self.store,
            codec: Arc::new(codec),
            hooks: self.hooks,
            timeout: self.timeout,
            cursor_batch_size: self.cursor_batch_size,
            _entity: PhantomData,
        }
    }

    pub fn with_hooks(mut self, hooks: impl RepositoryHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Upper bound for every single store round trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cursor_batch_size(mut self, batch_size: u64) -> Self {
        self.cursor_batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Persist a new entity, assigning an id when it has none.
    pub async fn create(&self, mut entity: E) -> Result<E, RepositoryError> {
        stamp_new(&mut entity);
        self.execute("create", None, async {
            let document = self.codec.encode(&entity)?;
            let stored = self.store.insert(E::COLLECTION, document).await?;
            Ok::<_, RepositoryError>(self.codec.decode(stored)?)
        })
        .await
    }

    /// Persist all entities or none of them.
    pub async fn create_many(&self, entities: Vec<E>) -> Result<Vec<E>, RepositoryError> {
        self.execute("create_many", None, async {
            let documents = entities
                .into_iter()
                .map(|mut entity| {
                    stamp_new(&mut entity);
                    self.codec.encode(&entity)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let stored = self.store.insert_many(E::COLLECTION, documents).await?;
            self.decode_all(stored)
        })
        .await
    }

    /// Look up one entity by id. The id is validated before any store call.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<E>, RepositoryError> {
        let id = self.parse_id("find_by_id", id)?;
        let filter = Filter::by_id(id);
        self.execute("find_by_id", Some(&filter), async {
            let document = self
                .store
                .find(E::COLLECTION, &filter, FindOptions::limited(1))
                .await?
                .pop();
            Ok::<_, RepositoryError>(document.map(|d| self.codec.decode(d)).transpose()?)
        })
        .await
    }

    pub async fn find_many_by_id<I>(&self, ids: I) -> Result<Vec<E>, RepositoryError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let ids = ids
            .into_iter()
            .map(|id| self.parse_id("find_many_by_id", id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let filter = Filter::id_in(ids);
        self.execute("find_many_by_id", Some(&filter), async {
            let documents = self
                .store
                .find(E::COLLECTION, &filter, FindOptions::default())
                .await?;
            self.decode_all(documents)
        })
        .await
    }

    /// The first entity matching `filter`; `NotFound` when there is none.
    pub async fn find_one(&self, filter: &Filter) -> Result<E, RepositoryError> {
        self.execute("find_one", Some(filter), async {
            let document = self
                .store
                .find(E::COLLECTION, filter, FindOptions::limited(1))
                .await?
                .pop()
                .ok_or(RepositoryError::NotFound)?;
            Ok::<_, RepositoryError>(self.codec.decode(document)?)
        })
        .await
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<E>, RepositoryError> {
        self.find_with("find", filter, FindOptions::default()).await
    }

    /// Stream every entity matching `filter` without materializing them all.
    ///
    /// Entities are fetched in id order, one batch at a time. Each call starts
    /// a fresh iteration.
    pub fn find_cursor(&self, filter: Filter) -> EntityStream<E> {
        let store = Arc::clone(&self.store);
        let codec = Arc::clone(&self.codec);
        let timeout = self.timeout;
        let batch_size = self.cursor_batch_size;
        let logged_filter = filter.clone();

        let batches = stream::try_unfold(
            Some(None),
            move |position: Option<Option<DocumentId>>| {
                let store = Arc::clone(&store);
                let codec = Arc::clone(&codec);
                let filter = filter.clone();
                async move {
                    match position {
                        None => Ok(None),
                        Some(after) => {
                            next_batch::<E, S, C>(store, codec, filter, after, batch_size, timeout)
                                .await
                        }
                    }
                }
            },
        );

        Box::pin(
            batches
                .map_ok(|batch| stream::iter(batch.into_iter().map(Ok)))
                .try_flatten()
                .inspect_err(move |error| {
                    log_failure(E::COLLECTION, "find_cursor", Some(&logged_filter), error)
                }),
        )
    }

    /// Page `page` (1-based) of `limit` entities.
    ///
    /// `skip = (page - 1) * limit` is applied literally; a negative skip is
    /// clamped to zero, a zero limit means no limit and a negative limit is
    /// read as its absolute value.
    pub async fn apply_pagination(
        &self,
        filter: &Filter,
        page: i64,
        limit: i64,
    ) -> Result<Vec<E>, RepositoryError> {
        let options = pagination_options(page, limit);
        if page < 1 || limit < 0 {
            tracing::warn!(page, limit, ?options, "Out of range pagination clamped");
        }
        self.find_with("apply_pagination", filter, options).await
    }

    pub async fn limit_query(&self, filter: &Filter, limit: u64) -> Result<Vec<E>, RepositoryError> {
        self.find_with("limit_query", filter, FindOptions::limited(limit))
            .await
    }

    /// Up to `limit` entities whose id sorts after `id`.
    pub async fn limit_query_after(&self, id: &str, limit: u64) -> Result<Vec<E>, RepositoryError> {
        let id = self.parse_id("limit_query_after", id)?;
        self.find_with(
            "limit_query_after",
            &Filter::id_after(id),
            FindOptions::limited(limit),
        )
        .await
    }

    /// Update the first match and return it as it is after the update.
    pub async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<E>, RepositoryError> {
        let update = stamp_update(update);
        self.execute("find_one_and_update", Some(filter), async {
            let document = self.store.update_one(E::COLLECTION, filter, &update).await?;
            Ok::<_, RepositoryError>(document.map(|d| self.codec.decode(d)).transpose()?)
        })
        .await
    }

    pub async fn find_many_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Vec<E>, RepositoryError> {
        let update = stamp_update(update);
        self.execute("find_many_and_update", Some(filter), async {
            let documents = self
                .store
                .update_many(E::COLLECTION, filter, &update)
                .await?;
            self.decode_all(documents)
        })
        .await
    }

    pub async fn find_one_by_id_and_update(
        &self,
        id: &str,
        update: &Update,
    ) -> Result<Option<E>, RepositoryError> {
        let id = self.parse_id("find_one_by_id_and_update", id)?;
        self.find_one_and_update(&Filter::by_id(id), update).await
    }

    /// Delete the first match. Deleting nothing is not an error.
    pub async fn delete_one(&self, filter: &Filter) -> Result<(), RepositoryError> {
        self.execute("delete_one", Some(filter), async {
            let deleted = self.store.delete_one(E::COLLECTION, filter).await?;
            if !deleted {
                tracing::debug!(collection = E::COLLECTION, ?filter, "Nothing to delete");
            }
            Ok::<_, RepositoryError>(())
        })
        .await
    }

    pub async fn delete_one_by_id(&self, id: &str) -> Result<(), RepositoryError> {
        let id = self.parse_id("delete_one_by_id", id)?;
        self.delete_one(&Filter::by_id(id)).await
    }

    pub async fn delete_many(&self, filter: &Filter) -> Result<u64, RepositoryError> {
        self.execute("delete_many", Some(filter), async {
            Ok::<_, RepositoryError>(self.store.delete_many(E::COLLECTION, filter).await?)
        })
        .await
    }

    pub async fn exist(&self, filter: &Filter) -> Result<bool, RepositoryError> {
        self.execute("exist", Some(filter), async {
            let documents = self
                .store
                .find(E::COLLECTION, filter, FindOptions::limited(1))
                .await?;
            Ok::<_, RepositoryError>(!documents.is_empty())
        })
        .await
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64, RepositoryError> {
        self.execute("count", Some(filter), async {
            Ok::<_, RepositoryError>(self.store.count(E::COLLECTION, filter).await?)
        })
        .await
    }

    /// Administrative; callers treat a failure as fatal to startup.
    pub async fn create_index(&self, index: &IndexSpec) -> Result<(), RepositoryError> {
        self.execute("create_index", None, async {
            self.store.create_index(E::COLLECTION, index).await?;
            tracing::info!(collection = E::COLLECTION, index = %index.name, "Index ensured");
            Ok::<_, RepositoryError>(())
        })
        .await
    }

    pub async fn invoke_events(&self, entity: &E, events: &[String]) -> Result<(), RepositoryError> {
        let document = self.codec.encode(entity)?;
        self.hooks
            .invoke_events(E::COLLECTION, &document, events)
            .await;
        Ok(())
    }

    pub async fn save_to_cache(&self, key: &str, data: &Value, ttl: Option<Duration>) {
        self.hooks.save_to_cache(key, data, ttl).await
    }

    pub async fn retrieve_from_cache(&self, key: &str) -> Option<Value> {
        self.hooks.retrieve_from_cache(key).await
    }

    async fn find_with(
        &self,
        operation: &'static str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<E>, RepositoryError> {
        self.execute(operation, Some(filter), async {
            let documents = self.store.find(E::COLLECTION, filter, options).await?;
            self.decode_all(documents)
        })
        .await
    }

    fn decode_all(&self, documents: Vec<Value>) -> Result<Vec<E>, RepositoryError> {
        documents
            .into_iter()
            .map(|document| self.codec.decode(document).map_err(RepositoryError::from))
            .collect()
    }

    fn parse_id(&self, operation: &str, raw: &str) -> Result<DocumentId, RepositoryError> {
        DocumentId::parse(raw).map_err(|e| {
            let error = RepositoryError::from(e);
            log_failure(E::COLLECTION, operation, None, &error);
            error
        })
    }

    async fn execute<T, F>(
        &self,
        operation: &str,
        filter: Option<&Filter>,
        call: F,
    ) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::TransientStoreError(format!(
                "{operation} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };
        if let Err(error) = &result {
            log_failure(E::COLLECTION, operation, filter, error);
        }
        result
    }
}

/// Translate a 1-based page and a page size into store options.
pub fn pagination_options(page: i64, limit: i64) -> FindOptions {
    let skip = page.saturating_sub(1).saturating_mul(limit);
    FindOptions {
        skip: u64::try_from(skip).unwrap_or(0),
        limit: match limit {
            0 => None,
            limit => Some(limit.unsigned_abs()),
        },
    }
}

async fn next_batch<E, S, C>(
    store: Arc<S>,
    codec: Arc<C>,
    filter: Filter,
    after: Option<DocumentId>,
    batch_size: u64,
    timeout: Duration,
) -> Result<Option<(Vec<E>, Option<Option<DocumentId>>)>, RepositoryError>
where
    E: Entity,
    S: DocumentStore,
    C: EntityCodec<E>,
{
    let page = match after {
        Some(id) => Filter::and([filter, Filter::id_after(id)]),
        None => filter,
    };
    let documents = tokio::time::timeout(
        timeout,
        store.find(E::COLLECTION, &page, FindOptions::limited(batch_size)),
    )
    .await
    .map_err(|_| {
        RepositoryError::TransientStoreError(format!(
            "find_cursor batch timed out after {}ms",
            timeout.as_millis()
        ))
    })??;

    if documents.is_empty() {
        return Ok(None);
    }
    let exhausted = (documents.len() as u64) < batch_size;
    let entities = documents
        .into_iter()
        .map(|document| codec.decode(document))
        .collect::<Result<Vec<E>, _>>()?;

    let next = if exhausted {
        None
    } else {
        entities.last().and_then(Entity::id).map(|id| Some(*id))
    };
    Ok(Some((entities, next)))
}

fn stamp_new<E: Entity>(entity: &mut E) {
    let now = Utc::now();
    let metadata = entity.metadata_mut();
    if metadata.id.is_none() {
        metadata.id = Some(DocumentId::new());
    }
    metadata.created_at.get_or_insert(now);
    metadata.updated_at = Some(now);
    metadata.version.get_or_insert(0);
}

fn stamp_update(update: &Update) -> Update {
    let mut update = update.clone().set("updatedAt", Utc::now().to_rfc3339());
    if !update.touches("version") {
        update = update.increment("version", 1);
    }
    update
}

fn log_failure(collection: &str, operation: &str, filter: Option<&Filter>, error: &RepositoryError) {
    match (error, filter) {
        (RepositoryError::NotFound, Some(filter)) => {
            tracing::warn!(collection, operation, ?filter, "Document not found")
        }
        (_, Some(filter)) => {
            tracing::error!(collection, operation, ?filter, %error, "Repository operation failed")
        }
        (_, None) => tracing::error!(collection, operation, %error, "Repository operation failed"),
    }
}
