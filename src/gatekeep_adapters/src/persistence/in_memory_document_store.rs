use std::{collections::BTreeMap, sync::Arc};

use dashmap::DashMap;
use gatekeep_core::{
    DocumentId, DocumentStore, Filter, FindOptions, IndexSpec, StoreError, Update,
    query::{document_id, lookup},
};
use serde_json::Value;
use tokio::sync::RwLock;

const PRIMARY_KEY_INDEX: &str = "_id_";

#[derive(Default)]
struct Collection {
    documents: BTreeMap<DocumentId, Value>,
    unique_indexes: Vec<IndexSpec>,
}

impl Collection {
    /// Reject `candidate` if another document shares its key in a unique
    /// index. Documents missing an indexed field are not indexed.
    fn check_unique(&self, candidate: &Value, own_id: DocumentId) -> Result<(), StoreError> {
        self.check_unique_with(candidate, own_id, &[])
    }

    /// As `check_unique`, also counting documents staged for the same batch.
    fn check_unique_with(
        &self,
        candidate: &Value,
        own_id: DocumentId,
        staged: &[(DocumentId, Value)],
    ) -> Result<(), StoreError> {
        for index in &self.unique_indexes {
            let Some(key) = index_key(index, candidate) else {
                continue;
            };
            let clash = self
                .documents
                .iter()
                .chain(staged.iter().map(|(id, other)| (id, other)))
                .any(|(id, other)| *id != own_id && index_key(index, other).as_ref() == Some(&key));
            if clash {
                return Err(StoreError::Duplicate {
                    index: index.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn matching<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = (&'a DocumentId, &'a Value)> {
        self.documents
            .iter()
            .filter(move |(_, document)| filter.matches(document))
    }

    fn update(&mut self, id: DocumentId, update: &Update) -> Result<Value, StoreError> {
        let mut updated = self
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::Malformed(format!("document {id} vanished")))?;
        update.apply(&mut updated);
        if document_id(&updated) != Some(id) {
            return Err(StoreError::Malformed("updates may not change the id".to_owned()));
        }
        self.check_unique(&updated, id)?;
        self.documents.insert(id, updated.clone());
        Ok(updated)
    }
}

fn index_key(index: &IndexSpec, document: &Value) -> Option<Vec<Value>> {
    index
        .fields
        .iter()
        .map(|field| lookup(document, field).cloned())
        .collect()
}

fn require_id(document: &Value) -> Result<DocumentId, StoreError> {
    document_id(document)
        .ok_or_else(|| StoreError::Malformed("document has no valid id".to_owned()))
}

/// `DocumentStore` kept in process memory, one lock per collection.
#[derive(Default, Clone)]
pub struct InMemoryDocumentStore {
    collections: Arc<DashMap<String, Arc<RwLock<Collection>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> Arc<RwLock<Collection>> {
        self.collections
            .entry(name.to_owned())
            .or_default()
            .value()
            .clone()
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError> {
        let mut inserted = self.insert_many(collection, vec![document]).await?;
        inserted
            .pop()
            .ok_or_else(|| StoreError::Malformed("nothing inserted".to_owned()))
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<Value>, StoreError> {
        let collection = self.collection(collection);
        let mut collection = collection.write().await;

        // Nothing is written until every document of the batch passed.
        let mut staged: Vec<(DocumentId, Value)> = Vec::with_capacity(documents.len());
        for document in &documents {
            let id = require_id(document)?;
            if collection.documents.contains_key(&id)
                || staged.iter().any(|(staged_id, _)| *staged_id == id)
            {
                return Err(StoreError::Duplicate {
                    index: PRIMARY_KEY_INDEX.to_owned(),
                });
            }
            collection.check_unique_with(document, id, &staged)?;
            staged.push((id, document.clone()));
        }
        collection.documents.extend(staged);
        Ok(documents)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let collection = self.collection(collection);
        let collection = collection.read().await;
        let limit = options
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(collection
            .matching(filter)
            .skip(usize::try_from(options.skip).unwrap_or(usize::MAX))
            .take(limit)
            .map(|(_, document)| document.clone())
            .collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Value>, StoreError> {
        let collection = self.collection(collection);
        let mut collection = collection.write().await;
        let Some(id) = collection.matching(filter).map(|(id, _)| *id).next() else {
            return Ok(None);
        };
        collection.update(id, update).map(Some)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Vec<Value>, StoreError> {
        let collection = self.collection(collection);
        let mut collection = collection.write().await;
        let ids: Vec<DocumentId> = collection.matching(filter).map(|(id, _)| *id).collect();

        let snapshot = collection.documents.clone();
        let mut updated = Vec::with_capacity(ids.len());
        for id in ids {
            match collection.update(id, update) {
                Ok(document) => updated.push(document),
                Err(e) => {
                    collection.documents = snapshot;
                    return Err(e);
                }
            }
        }
        Ok(updated)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        let collection = self.collection(collection);
        let mut collection = collection.write().await;
        let Some(id) = collection.matching(filter).map(|(id, _)| *id).next() else {
            return Ok(false);
        };
        Ok(collection.documents.remove(&id).is_some())
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let collection = self.collection(collection);
        let mut collection = collection.write().await;
        let before = collection.documents.len();
        collection
            .documents
            .retain(|_, document| !filter.matches(document));
        Ok((before - collection.documents.len()) as u64)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let collection = self.collection(collection);
        let collection = collection.read().await;
        Ok(collection.matching(filter).count() as u64)
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        if !index.unique {
            return Ok(());
        }
        let collection = self.collection(collection);
        let mut collection = collection.write().await;
        if collection
            .unique_indexes
            .iter()
            .any(|existing| existing.name == index.name)
        {
            return Ok(());
        }

        let mut seen = Vec::new();
        for document in collection.documents.values() {
            if let Some(key) = index_key(index, document) {
                if seen.contains(&key) {
                    return Err(StoreError::Duplicate {
                        index: index.name.clone(),
                    });
                }
                seen.push(key);
            }
        }
        collection.unique_indexes.push(index.clone());
        Ok(())
    }
}
