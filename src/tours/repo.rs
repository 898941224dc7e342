use serde_json::{json, Value};
use uuid::Uuid;

use crate::query::QueryDescriptor;
use crate::store::{decode, id_filter, Collection, Document, DocumentStore, Patch, StoreError};
use crate::tours::repo_types::Tour;

/// Secret tours are excluded from every lookup.
pub fn visible_scope() -> Value {
    json!({ "secretTour": { "$ne": true } })
}

fn scoped(filter: Value) -> Value {
    json!({ "$and": [visible_scope(), filter] })
}

impl Tour {
    pub async fn find_document(store: &dyn DocumentStore, id: Uuid) -> Result<Option<Document>, StoreError> {
        store.find_one(Collection::Tours, &scoped(id_filter(id))).await
    }

    pub async fn exists(store: &dyn DocumentStore, id: Uuid) -> Result<bool, StoreError> {
        Ok(Self::find_document(store, id).await?.is_some())
    }

    /// Visible tours matching `filter`, decoded for aggregation.
    pub async fn all_matching(store: &dyn DocumentStore, filter: Value) -> Result<Vec<Tour>, StoreError> {
        store
            .find(Collection::Tours, &QueryDescriptor::for_filter(scoped(filter)))
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn insert(store: &dyn DocumentStore, doc: Document) -> Result<Document, StoreError> {
        store.create(Collection::Tours, doc).await
    }

    pub async fn update(store: &dyn DocumentStore, id: Uuid, patch: &Patch) -> Result<Option<Document>, StoreError> {
        store.update_one(Collection::Tours, &scoped(id_filter(id)), patch).await
    }

    pub async fn delete(store: &dyn DocumentStore, id: Uuid) -> Result<bool, StoreError> {
        if !Self::exists(store, id).await? {
            return Ok(false);
        }
        Ok(store.find_by_id_and_delete(Collection::Tours, id).await?.is_some())
    }

    /// Writes review aggregates. Applies to secret tours too.
    pub async fn set_ratings(
        store: &dyn DocumentStore,
        id: Uuid,
        quantity: u64,
        average: f64,
    ) -> Result<(), StoreError> {
        let patch = Patch::new()
            .set("ratingsQuantity", quantity)
            .set("ratingsAverage", average);
        store.find_by_id_and_update(Collection::Tours, id, &patch).await?;
        Ok(())
    }
}
