use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

use crate::query::{Filter, FindOptions, IndexSpec, Update};

// DocumentStore port trait and errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Unique index {index} violated")]
    Duplicate { index: String },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed document or query: {0}")]
    Malformed(String),
}

impl PartialEq for StoreError {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Duplicate { .. }, Self::Duplicate { .. })
                | (Self::Unavailable(_), Self::Unavailable(_))
                | (Self::Malformed(_), Self::Malformed(_))
        )
    }
}

/// Raw document persistence, one JSON document per entity.
///
/// Every document carries its identifier in the `id` field. Results of `find`
/// are ordered by id. Update operations return the documents as they are after
/// the update.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError>;

    /// Insert all documents or none of them.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Value>, StoreError>;

    /// Update the first matching document. `None` when nothing matched.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Value>, StoreError>;

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Vec<Value>, StoreError>;

    /// Delete the first matching document. Returns whether one was removed.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Codec error: {0}")]
pub struct CodecError(pub String);

/// Converts entities to and from their stored document form.
pub trait EntityCodec<E>: Send + Sync {
    fn encode(&self, entity: &E) -> Result<Value, CodecError>;
    fn decode(&self, document: Value) -> Result<E, CodecError>;
}

/// Codec going through the entity's serde representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<E> EntityCodec<E> for JsonCodec
where
    E: Serialize + DeserializeOwned,
{
    fn encode(&self, entity: &E) -> Result<Value, CodecError> {
        serde_json::to_value(entity).map_err(|e| CodecError(e.to_string()))
    }

    fn decode(&self, document: Value) -> Result<E, CodecError> {
        serde_json::from_value(document).map_err(|e| CodecError(e.to_string()))
    }
}

/// Optional extension points of a repository.
///
/// All methods default to no-ops so implementors only override what they
/// need. Hooks never fail the repository operation that called them.
#[async_trait]
pub trait RepositoryHooks: Send + Sync {
    async fn invoke_events(&self, _collection: &str, _document: &Value, _events: &[String]) {}

    async fn save_to_cache(&self, _key: &str, _data: &Value, _ttl: Option<Duration>) {}

    async fn retrieve_from_cache(&self, _key: &str) -> Option<Value> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl RepositoryHooks for NoHooks {}
