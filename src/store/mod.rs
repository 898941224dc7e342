//! Document store abstraction.
//!
//! Every persisted entity is a JSON object living in one of a few named
//! collections. Backends implement [`DocumentStore`]; the domain modules only
//! ever talk to the trait.

mod matcher;
pub mod memory;
pub mod postgres;
mod sql;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::query::{Projection, QueryDescriptor};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Document = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tours,
    Users,
    Reviews,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Tours => "tours",
            Collection::Users => "users",
            Collection::Reviews => "reviews",
        }
    }

    /// Unique indexes as (index name, fields). Postgres indexes in
    /// `migrations/` carry the same names.
    pub fn unique_indexes(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            Collection::Tours => &[("tours_name_unique", &["name"])],
            Collection::Users => &[("users_email_unique", &["email"])],
            Collection::Reviews => &[("reviews_tour_user_unique", &["tour", "user"])],
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate value for {fields}: {value}")]
    DuplicateKey { fields: String, value: String },

    #[error("invalid {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("unsupported filter operator: {0}")]
    UnsupportedOperator(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Partial update applied to a single document. `set` keys are merged into
/// the document, `unset` keys are removed.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub set: Map<String, Value>,
    pub unset: Vec<String>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set.insert(field.to_string(), value.into());
        self
    }

    pub fn unset(mut self, field: &str) -> Self {
        self.unset.push(field.to_string());
        self
    }

    /// Builds a patch from a JSON object; `null` values become unsets.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let mut patch = Self::new();
        for (key, value) in object {
            if value.is_null() {
                patch.unset.push(key);
            } else {
                patch.set.insert(key, value);
            }
        }
        patch
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    pub(crate) fn apply(&self, doc: &mut Document) {
        if let Value::Object(obj) = doc {
            for (k, v) in &self.set {
                obj.insert(k.clone(), v.clone());
            }
            for k in &self.unset {
                obj.remove(k);
            }
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: Collection, query: &QueryDescriptor) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: Collection, filter: &Value) -> Result<u64, StoreError>;

    async fn find_one(&self, collection: Collection, filter: &Value) -> Result<Option<Document>, StoreError>;

    async fn find_by_id(&self, collection: Collection, id: Uuid) -> Result<Option<Document>, StoreError> {
        self.find_one(collection, &id_filter(id)).await
    }

    async fn create(&self, collection: Collection, doc: Document) -> Result<Document, StoreError>;

    /// Atomically updates the first document still matching `filter`.
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Value,
        patch: &Patch,
    ) -> Result<Option<Document>, StoreError>;

    async fn find_by_id_and_update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: &Patch,
    ) -> Result<Option<Document>, StoreError> {
        self.update_one(collection, &id_filter(id), patch).await
    }

    async fn find_by_id_and_delete(&self, collection: Collection, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn delete_many(&self, collection: Collection, filter: &Value) -> Result<u64, StoreError>;
}

pub fn id_filter(id: Uuid) -> Value {
    serde_json::json!({ "id": id.to_string() })
}

/// Stored timestamps are UTC RFC 3339 truncated to whole seconds so that
/// lexical and chronological order agree.
pub fn timestamp(at: OffsetDateTime) -> Result<Value, StoreError> {
    let utc = at.to_offset(UtcOffset::UTC);
    let truncated = utc - Duration::nanoseconds(utc.nanosecond() as i64);
    truncated
        .format(&Rfc3339)
        .map(Value::String)
        .map_err(|e| StoreError::Malformed(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Fills in `id` and `createdAt` for a document about to be inserted.
pub(crate) fn prepare_insert(mut doc: Document) -> Result<(Uuid, OffsetDateTime, Document), StoreError> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| StoreError::Malformed("document must be an object".into()))?;
    let id = match obj.get("id").and_then(Value::as_str) {
        Some(raw) => Uuid::parse_str(raw).map_err(|_| StoreError::InvalidValue {
            field: "id".into(),
            value: raw.into(),
        })?,
        None => Uuid::new_v4(),
    };
    let created_at = OffsetDateTime::now_utc();
    obj.insert("id".into(), Value::String(id.to_string()));
    if !obj.contains_key("createdAt") {
        obj.insert("createdAt".into(), timestamp(created_at)?);
    }
    Ok((id, created_at, doc))
}

pub(crate) fn apply_projection(doc: Document, projection: &Projection) -> Document {
    let Value::Object(obj) = doc else { return doc };
    let projected: Map<String, Value> = match projection {
        Projection::All => obj,
        Projection::Include(fields) => obj
            .into_iter()
            .filter(|(k, _)| k == "id" || fields.iter().any(|f| f == k))
            .collect(),
        Projection::Exclude(fields) => obj
            .into_iter()
            .filter(|(k, _)| !fields.iter().any(|f| f == k))
            .collect(),
    };
    Value::Object(projected)
}

/// Ordering used for sorting. Missing and null values sort first, like the
/// document databases this mirrors; values of different types order by type.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
