//! `DocumentStore` on a single PostgreSQL table of JSONB documents.
//!
//! Every collection shares one table keyed by `(collection, id)`. Filters are
//! translated to SQL with bound parameters; updates are read-modify-write
//! inside a transaction holding the row locks.

use std::sync::LazyLock;

use gatekeep_core::{
    DocumentId, DocumentStore, Filter, FindOptions, IndexSpec, StoreError, Update,
    query::document_id,
};
use regex::Regex;
use serde_json::Value;
use sqlx::{
    PgPool, Postgres, Row,
    postgres::{PgArguments, PgRow},
    query::Query,
    types::Json,
};
use uuid::Uuid;

pub const DEFAULT_TABLE: &str = "documents";

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier regex is valid")
});

#[derive(Debug)]
enum Bind {
    Text(String),
    Path(Vec<String>),
    Json(Value),
    Uuid(Uuid),
    Uuids(Vec<Uuid>),
}

/// Accumulates a WHERE clause and its positional parameters.
#[derive(Debug, Default)]
struct SqlFilter {
    binds: Vec<Bind>,
}

impl SqlFilter {
    fn push(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    /// Start a statement scoped to `collection`, bound as `$1`.
    fn scoped(collection: &str) -> Self {
        let mut filter = Self::default();
        filter.push(Bind::Text(collection.to_owned()));
        filter
    }

    fn clause(&mut self, filter: &Filter) -> String {
        match filter {
            Filter::All => "TRUE".to_owned(),
            Filter::Eq { path, value } => {
                let path = self.push(Bind::Path(segments(path)));
                let value = self.push(Bind::Json(value.clone()));
                format!("doc #> {path} = {value}")
            }
            Filter::ElemMatch { path, fields } => {
                let path = self.push(Bind::Path(segments(path)));
                let element = Value::Array(vec![Value::Object(fields.clone())]);
                let element = self.push(Bind::Json(element));
                format!("jsonb_typeof(doc #> {path}) = 'array' AND doc #> {path} @> {element}")
            }
            Filter::IdIn { ids } if ids.is_empty() => "FALSE".to_owned(),
            Filter::IdIn { ids } => {
                let ids = self.push(Bind::Uuids(ids.iter().map(|id| *id.as_uuid()).collect()));
                format!("id = ANY({ids})")
            }
            Filter::IdAfter { id } => {
                let id = self.push(Bind::Uuid(*id.as_uuid()));
                format!("id > {id}")
            }
            Filter::And { clauses } if clauses.is_empty() => "TRUE".to_owned(),
            Filter::And { clauses } => clauses
                .iter()
                .map(|clause| format!("({})", self.clause(clause)))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    fn bind_to<'q>(
        self,
        mut query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        for bind in self.binds {
            query = match bind {
                Bind::Text(text) => query.bind(text),
                Bind::Path(path) => query.bind(path),
                Bind::Json(value) => query.bind(Json(value)),
                Bind::Uuid(id) => query.bind(id),
                Bind::Uuids(ids) => query.bind(ids),
            };
        }
        query
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('.').map(str::to_owned).collect()
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    if let Some(db_err) = e.as_database_error() {
        if let Some(constraint) = db_err.constraint() {
            return StoreError::Duplicate {
                index: constraint.to_owned(),
            };
        }
    }
    match e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            StoreError::Malformed(e.to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn decode_row(row: &PgRow) -> Result<Value, StoreError> {
    row.try_get::<Json<Value>, _>("doc")
        .map(|doc| doc.0)
        .map_err(|e| StoreError::Malformed(e.to_string()))
}

fn require_id(document: &Value) -> Result<DocumentId, StoreError> {
    document_id(document)
        .ok_or_else(|| StoreError::Malformed("document has no valid id".to_owned()))
}

fn checked_identifier(kind: &str, name: &str) -> Result<(), StoreError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::Malformed(format!("invalid {kind} name {name:?}")))
    }
}

#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
    table: String,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_owned(),
        }
    }

    pub fn with_table(pool: PgPool, table: &str) -> Result<Self, StoreError> {
        checked_identifier("table", table)?;
        Ok(Self {
            pool,
            table: table.to_owned(),
        })
    }

    /// Create the document table if it does not exist yet.
    #[tracing::instrument(name = "Ensuring document table", skip(self), fields(table = %self.table))]
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        let statement = format!(
            r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    collection TEXT NOT NULL,
                    id UUID NOT NULL,
                    doc JSONB NOT NULL,
                    PRIMARY KEY (collection, id)
                )
            "#,
            table = self.table
        );
        sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Matching rows in id order, locked for update when `lock` is set.
    fn select(&self, collection: &str, filter: &Filter, options: FindOptions, lock: bool) -> (String, SqlFilter) {
        let mut sql = SqlFilter::scoped(collection);
        let clause = sql.clause(filter);
        let mut statement = format!(
            "SELECT id, doc FROM {} WHERE collection = $1 AND ({clause}) ORDER BY id",
            self.table
        );
        if let Some(limit) = options.limit {
            statement.push_str(&format!(" LIMIT {limit}"));
        }
        if options.skip > 0 {
            statement.push_str(&format!(" OFFSET {}", options.skip));
        }
        if lock {
            statement.push_str(" FOR UPDATE");
        }
        (statement, sql)
    }

    async fn update_matching(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let (statement, binds) = self.select(collection, filter, options, true);
        let rows = binds
            .bind_to(sqlx::query(&statement))
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let write = format!(
            "UPDATE {} SET doc = $3 WHERE collection = $1 AND id = $2",
            self.table
        );
        let mut updated = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: Uuid = row
                .try_get("id")
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
            let mut document = decode_row(row)?;
            update.apply(&mut document);
            if document_id(&document).map(|doc_id| *doc_id.as_uuid()) != Some(id) {
                return Err(StoreError::Malformed("updates may not change the id".to_owned()));
            }
            sqlx::query(&write)
                .bind(collection)
                .bind(id)
                .bind(Json(&document))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            updated.push(document);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[tracing::instrument(name = "Inserting document into PostgreSQL", skip(self, document))]
    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError> {
        let id = require_id(&document)?;
        let statement = format!(
            "INSERT INTO {} (collection, id, doc) VALUES ($1, $2, $3)",
            self.table
        );
        sqlx::query(&statement)
            .bind(collection)
            .bind(*id.as_uuid())
            .bind(Json(&document))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(document)
    }

    #[tracing::instrument(name = "Inserting documents into PostgreSQL", skip(self, documents))]
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<Value>, StoreError> {
        let statement = format!(
            "INSERT INTO {} (collection, id, doc) VALUES ($1, $2, $3)",
            self.table
        );
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for document in &documents {
            let id = require_id(document)?;
            sqlx::query(&statement)
                .bind(collection)
                .bind(*id.as_uuid())
                .bind(Json(document))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(documents)
    }

    #[tracing::instrument(name = "Finding documents in PostgreSQL", skip(self))]
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let (statement, binds) = self.select(collection, filter, options, false);
        let rows = binds
            .bind_to(sqlx::query(&statement))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(decode_row).collect()
    }

    #[tracing::instrument(name = "Updating document in PostgreSQL", skip(self, update))]
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Value>, StoreError> {
        let mut updated = self
            .update_matching(collection, filter, update, FindOptions::limited(1))
            .await?;
        Ok(updated.pop())
    }

    #[tracing::instrument(name = "Updating documents in PostgreSQL", skip(self, update))]
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Vec<Value>, StoreError> {
        self.update_matching(collection, filter, update, FindOptions::default())
            .await
    }

    #[tracing::instrument(name = "Deleting document from PostgreSQL", skip(self))]
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        let mut sql = SqlFilter::scoped(collection);
        let clause = sql.clause(filter);
        let statement = format!(
            r#"
                DELETE FROM {table}
                WHERE collection = $1 AND id = (
                    SELECT id FROM {table}
                    WHERE collection = $1 AND ({clause})
                    ORDER BY id
                    LIMIT 1
                )
            "#,
            table = self.table
        );
        let result = sql
            .bind_to(sqlx::query(&statement))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(name = "Deleting documents from PostgreSQL", skip(self))]
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut sql = SqlFilter::scoped(collection);
        let clause = sql.clause(filter);
        let statement = format!(
            "DELETE FROM {} WHERE collection = $1 AND ({clause})",
            self.table
        );
        let result = sql
            .bind_to(sqlx::query(&statement))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(name = "Counting documents in PostgreSQL", skip(self))]
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut sql = SqlFilter::scoped(collection);
        let clause = sql.clause(filter);
        let statement = format!(
            "SELECT COUNT(*) AS total FROM {} WHERE collection = $1 AND ({clause})",
            self.table
        );
        let row = sql
            .bind_to(sqlx::query(&statement))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    /// Expression index on the listed document paths, partial on the
    /// collection. Identifiers are validated because DDL cannot be bound.
    #[tracing::instrument(name = "Creating index in PostgreSQL", skip(self))]
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        checked_identifier("index", &index.name)?;
        checked_identifier("collection", collection)?;
        let mut expressions = Vec::with_capacity(index.fields.len());
        for field in &index.fields {
            let path = segments(field);
            for segment in &path {
                checked_identifier("field", segment)?;
            }
            expressions.push(format!("(doc #>> '{{{}}}')", path.join(",")));
        }
        if expressions.is_empty() {
            return Err(StoreError::Malformed(format!("index {} has no fields", index.name)));
        }

        let statement = format!(
            "CREATE {unique}INDEX IF NOT EXISTS {name} ON {table} ({expressions}) WHERE collection = '{collection}'",
            unique = if index.unique { "UNIQUE " } else { "" },
            name = index.name,
            table = self.table,
            expressions = expressions.join(", "),
        );
        sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
