use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a stored document.
///
/// Identifiers are time-ordered (UUID v7), so ordering by id follows insertion
/// order. Keyset pagination and cursor iteration rely on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid document id: {0}")]
pub struct InvalidDocumentId(pub String);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Validate an identifier locally, without touching any store.
    pub fn parse(raw: &str) -> Result<Self, InvalidDocumentId> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| InvalidDocumentId(raw.to_owned()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for DocumentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for DocumentId {
    type Err = InvalidDocumentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bookkeeping fields shared by every stored entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
    /// Optimistic-concurrency counter, bumped on every update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

/// A type that can be persisted through a repository.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Name of the collection documents of this type live in.
    const COLLECTION: &'static str;

    fn metadata(&self) -> &Metadata;

    fn metadata_mut(&mut self) -> &mut Metadata;

    fn id(&self) -> Option<&DocumentId> {
        self.metadata().id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert!(DocumentId::parse("not-an-id").is_err());
        assert!(DocumentId::parse("").is_err());
    }

    #[test]
    fn test_parse_round_trips_display() {
        let id = DocumentId::new();
        assert_eq!(DocumentId::parse(&id.to_string()), Ok(id));
    }

    #[test]
    fn test_metadata_skips_absent_fields() {
        let json = serde_json::to_value(Metadata::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "deleted": false }));
    }
}
