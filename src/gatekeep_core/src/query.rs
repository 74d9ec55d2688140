//! Store-neutral filter and update language.
//!
//! Paths are dotted field names into the JSON form of a document
//! (`services.google.userId`). Every `DocumentStore` must give these the same
//! meaning; `Filter::matches` and `Update::apply` are the reference semantics.

use serde_json::{Map, Value};

use crate::domain::document::DocumentId;

/// Name of the identifier field in every stored document.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// The value at `path` equals `value`.
    Eq { path: String, value: Value },
    /// The array at `path` holds at least one object carrying all of `fields`.
    ElemMatch {
        path: String,
        fields: Map<String, Value>,
    },
    /// The document id is one of `ids`.
    IdIn { ids: Vec<DocumentId> },
    /// The document id sorts strictly after `id`.
    IdAfter { id: DocumentId },
    /// Every clause matches.
    And { clauses: Vec<Filter> },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn elem_match<K, V, I>(path: impl Into<String>, fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Filter::ElemMatch {
            path: path.into(),
            fields: fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn by_id(id: DocumentId) -> Self {
        Filter::IdIn { ids: vec![id] }
    }

    pub fn id_in(ids: impl IntoIterator<Item = DocumentId>) -> Self {
        Filter::IdIn {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn id_after(id: DocumentId) -> Self {
        Filter::IdAfter { id }
    }

    /// Conjunction of `clauses`, flattening nested `And`s and dropping `All`.
    pub fn and(clauses: impl IntoIterator<Item = Filter>) -> Self {
        let mut flat = Vec::new();
        for clause in clauses {
            match clause {
                Filter::All => {}
                Filter::And { clauses } => flat.extend(clauses),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Filter::All,
            1 => flat.remove(0),
            _ => Filter::And { clauses: flat },
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { path, value } => lookup(document, path) == Some(value),
            Filter::ElemMatch { path, fields } => lookup(document, path)
                .and_then(Value::as_array)
                .is_some_and(|items| {
                    items.iter().any(|item| {
                        fields
                            .iter()
                            .all(|(key, expected)| item.get(key) == Some(expected))
                    })
                }),
            Filter::IdIn { ids } => document_id(document).is_some_and(|id| ids.contains(&id)),
            Filter::IdAfter { id } => document_id(document).is_some_and(|current| current > *id),
            Filter::And { clauses } => clauses.iter().all(|clause| clause.matches(document)),
        }
    }
}

/// Read the identifier of a JSON document, if it has a well-formed one.
pub fn document_id(document: &Value) -> Option<DocumentId> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|raw| DocumentId::parse(raw).ok())
}

/// Resolve a dotted path inside a JSON document.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

#[derive(Debug, Clone, PartialEq)]
enum UpdateOp {
    Set(String, Value),
    Unset(String),
    Increment(String, i64),
}

/// An ordered list of field mutations applied to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(path.into(), value.into()));
        self
    }

    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(path.into()));
        self
    }

    /// Add `by` to the integer at `path`, treating a missing value as zero.
    pub fn increment(mut self, path: impl Into<String>, by: i64) -> Self {
        self.ops.push(UpdateOp::Increment(path.into(), by));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether any operation touches `path` or something beneath it.
    pub fn touches(&self, path: &str) -> bool {
        self.ops.iter().any(|op| {
            let target = match op {
                UpdateOp::Set(target, _) | UpdateOp::Unset(target) => target,
                UpdateOp::Increment(target, _) => target,
            };
            target == path || target.starts_with(&format!("{path}."))
        })
    }

    pub fn apply(&self, document: &mut Value) {
        for op in &self.ops {
            match op {
                UpdateOp::Set(path, value) => {
                    if let Some(slot) = slot_mut(document, path) {
                        *slot = value.clone();
                    }
                }
                UpdateOp::Unset(path) => {
                    let (parent, leaf) = match path.rsplit_once('.') {
                        Some((parent, leaf)) => (lookup_mut(document, parent), leaf),
                        None => (Some(&mut *document), path.as_str()),
                    };
                    if let Some(Value::Object(map)) = parent {
                        map.remove(leaf);
                    }
                }
                UpdateOp::Increment(path, by) => {
                    if let Some(slot) = slot_mut(document, path) {
                        let current = slot.as_i64().unwrap_or(0);
                        *slot = Value::from(current.saturating_add(*by));
                    }
                }
            }
        }
    }
}

fn lookup_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get_mut(segment))
}

/// Walk to `path`, creating intermediate objects. Returns `None` when a
/// non-object value sits in the way.
fn slot_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = document;
    for segment in path.split('.') {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()?
            .entry(segment.to_owned())
            .or_insert(Value::Null);
    }
    Some(current)
}

/// Paging applied after filtering. Results are always ordered by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn limited(limit: u64) -> Self {
        Self {
            skip: 0,
            limit: Some(limit),
        }
    }
}

/// Index definition for `DocumentStore::create_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn unique(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|field| (*field).to_owned()).collect(),
            unique: true,
        }
    }
}
