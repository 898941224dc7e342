use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    postgres::{PgDatabaseError, PgPoolOptions},
    PgPool, Row,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{apply_projection, prepare_insert, sql, Collection, Document, DocumentStore, Patch, StoreError};
use crate::query::QueryDescriptor;

/// Postgres-backed store keeping every collection in one JSONB table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            warn!(error = %e, "migration failed; continuing");
        } else {
            info!("database migrations applied");
        }
        Ok(Self { pool })
    }
}

/// Pulls the offending value out of a unique-violation detail such as
/// `Key ((body ->> 'email'::text))=(a@x.io) already exists.`
fn duplicate_value(detail: &str) -> Option<&str> {
    let start = detail.find(")=(")? + 3;
    let end = detail.rfind(") already exists")?;
    (start <= end).then(|| &detail[start..end])
}

/// Maps Postgres error codes onto store errors. Everything else is a
/// backend failure.
fn map_db_error(collection: Collection, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => {
                let fields = db
                    .constraint()
                    .and_then(|name| {
                        collection
                            .unique_indexes()
                            .iter()
                            .find(|(index, _)| *index == name)
                            .map(|(_, fields)| fields.join(", "))
                    })
                    .unwrap_or_else(|| "id".to_string());
                debug!(message = db.message(), constraint = ?db.constraint(), "unique violation");
                let value = db
                    .try_downcast_ref::<PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .and_then(duplicate_value)
                    .map(str::to_string)
                    .unwrap_or_else(|| fields.clone());
                return StoreError::DuplicateKey { fields, value };
            }
            Some("22P02") => {
                debug!(message = db.message(), "invalid text representation");
                return StoreError::InvalidValue {
                    field: "value".into(),
                    value: "malformed input".into(),
                };
            }
            _ => {}
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context(format!("{} query failed", collection.as_str())))
}

fn body(row: &sqlx::postgres::PgRow) -> Result<Document, sqlx::Error> {
    row.try_get::<Value, _>("body")
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find(&self, collection: Collection, query: &QueryDescriptor) -> Result<Vec<Document>, StoreError> {
        let q = sql::select(collection, query)?;
        debug!(sql = %q.sql, "find");
        let rows = q.bind().fetch_all(&self.pool).await.map_err(|e| map_db_error(collection, e))?;
        rows.iter()
            .map(|row| {
                body(row)
                    .map(|doc| apply_projection(doc, &query.projection))
                    .map_err(|e| map_db_error(collection, e))
            })
            .collect()
    }

    async fn count(&self, collection: Collection, filter: &Value) -> Result<u64, StoreError> {
        let q = sql::count(collection, filter)?;
        let row = q.bind().fetch_one(&self.pool).await.map_err(|e| map_db_error(collection, e))?;
        let n: i64 = row.try_get("count").map_err(|e| map_db_error(collection, e))?;
        Ok(n.max(0) as u64)
    }

    async fn find_one(&self, collection: Collection, filter: &Value) -> Result<Option<Document>, StoreError> {
        let q = sql::find_one(collection, filter)?;
        let row = q.bind().fetch_optional(&self.pool).await.map_err(|e| map_db_error(collection, e))?;
        row.as_ref()
            .map(body)
            .transpose()
            .map_err(|e| map_db_error(collection, e))
    }

    async fn create(&self, collection: Collection, doc: Document) -> Result<Document, StoreError> {
        let (id, _, doc) = prepare_insert(doc)?;
        let q = sql::insert(collection, id, &doc);
        let row = q.bind().fetch_one(&self.pool).await.map_err(|e| map_db_error(collection, e))?;
        body(&row).map_err(|e| map_db_error(collection, e))
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Value,
        patch: &Patch,
    ) -> Result<Option<Document>, StoreError> {
        let q = sql::update_one(collection, filter, patch)?;
        let row = q.bind().fetch_optional(&self.pool).await.map_err(|e| map_db_error(collection, e))?;
        row.as_ref()
            .map(body)
            .transpose()
            .map_err(|e| map_db_error(collection, e))
    }

    async fn find_by_id_and_delete(&self, collection: Collection, id: Uuid) -> Result<Option<Document>, StoreError> {
        let q = sql::delete_by_id(collection, id);
        let row = q.bind().fetch_optional(&self.pool).await.map_err(|e| map_db_error(collection, e))?;
        row.as_ref()
            .map(body)
            .transpose()
            .map_err(|e| map_db_error(collection, e))
    }

    async fn delete_many(&self, collection: Collection, filter: &Value) -> Result<u64, StoreError> {
        let q = sql::delete_many(collection, filter)?;
        let row = q.bind().fetch_one(&self.pool).await.map_err(|e| map_db_error(collection, e))?;
        let n: i64 = row.try_get("count").map_err(|e| map_db_error(collection, e))?;
        Ok(n.max(0) as u64)
    }
}
