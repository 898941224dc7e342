use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    apply_projection, compare_values, matcher::matches, prepare_insert, Collection, Document, DocumentStore, Patch,
    StoreError,
};
use crate::query::{QueryDescriptor, SortDirection};

/// In-process store used by tests and by local runs without `DATABASE_URL`.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn doc_id(doc: &Document) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

fn check_unique(
    existing: &[Document],
    collection: Collection,
    candidate: &Document,
    ignore_id: Option<&str>,
) -> Result<(), StoreError> {
    for (_, fields) in collection.unique_indexes() {
        let key: Vec<&Value> = fields.iter().filter_map(|f| candidate.get(*f)).collect();
        if key.len() != fields.len() || key.iter().any(|v| v.is_null()) {
            continue;
        }
        let clash = existing.iter().any(|doc| {
            ignore_id.map_or(true, |id| doc_id(doc) != Some(id))
                && fields.iter().zip(&key).all(|(f, v)| doc.get(*f) == Some(*v))
        });
        if clash {
            let value = key.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
            return Err(StoreError::DuplicateKey {
                fields: fields.join(", "),
                value,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: Collection, query: &QueryDescriptor) -> Result<Vec<Document>, StoreError> {
        let guard = self.collections.read().await;
        let mut found = Vec::new();
        for doc in guard.get(&collection).map(Vec::as_slice).unwrap_or_default() {
            if matches(doc, &query.filter)? {
                found.push(doc.clone());
            }
        }
        drop(guard);

        found.sort_by(|a, b| {
            for key in &query.sort {
                let ord = compare_values(a.get(&key.field), b.get(&key.field));
                let ord = match key.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord.is_ne() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });

        let (skip, limit) = match &query.page {
            Some(p) => (p.skip() as usize, p.limit as usize),
            None => (0, usize::MAX),
        };
        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| apply_projection(doc, &query.projection))
            .collect())
    }

    async fn count(&self, collection: Collection, filter: &Value) -> Result<u64, StoreError> {
        let guard = self.collections.read().await;
        let mut n = 0;
        for doc in guard.get(&collection).map(Vec::as_slice).unwrap_or_default() {
            if matches(doc, filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn find_one(&self, collection: Collection, filter: &Value) -> Result<Option<Document>, StoreError> {
        let guard = self.collections.read().await;
        for doc in guard.get(&collection).map(Vec::as_slice).unwrap_or_default() {
            if matches(doc, filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn create(&self, collection: Collection, doc: Document) -> Result<Document, StoreError> {
        let (_, _, doc) = prepare_insert(doc)?;
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();
        check_unique(docs, collection, &doc, None)?;
        if docs.iter().any(|d| doc_id(d) == doc_id(&doc)) {
            return Err(StoreError::DuplicateKey {
                fields: "id".into(),
                value: doc_id(&doc).unwrap_or_default().to_string(),
            });
        }
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Value,
        patch: &Patch,
    ) -> Result<Option<Document>, StoreError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();

        let mut position = None;
        for (i, doc) in docs.iter().enumerate() {
            if matches(doc, filter)? {
                position = Some(i);
                break;
            }
        }
        let Some(i) = position else { return Ok(None) };

        let mut updated = docs[i].clone();
        patch.apply(&mut updated);
        let id = doc_id(&updated).map(str::to_string);
        check_unique(docs, collection, &updated, id.as_deref())?;
        docs[i] = updated.clone();
        Ok(Some(updated))
    }

    async fn find_by_id_and_delete(&self, collection: Collection, id: Uuid) -> Result<Option<Document>, StoreError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();
        let wanted = id.to_string();
        let position = docs.iter().position(|d| doc_id(d) == Some(wanted.as_str()));
        Ok(position.map(|i| docs.remove(i)))
    }

    async fn delete_many(&self, collection: Collection, filter: &Value) -> Result<u64, StoreError> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection).or_default();
        let doomed = docs
            .iter()
            .map(|doc| matches(doc, filter))
            .collect::<Result<Vec<bool>, _>>()?;
        let mut verdicts = doomed.iter();
        docs.retain(|_| !verdicts.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count() as u64)
    }
}
