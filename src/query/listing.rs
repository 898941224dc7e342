use tracing::debug;

use super::descriptor::QueryDescriptor;
use crate::error::AppError;
use crate::store::{Collection, Document, DocumentStore};

/// Executes a descriptor. An explicitly requested page past the last
/// matching document is reported as `NotFound` instead of an empty page.
pub async fn execute(
    store: &dyn DocumentStore,
    collection: Collection,
    descriptor: &QueryDescriptor,
) -> Result<Vec<Document>, AppError> {
    if let Some(page) = descriptor.page.filter(|p| p.requested && p.page > 1) {
        let total = store.count(collection, &descriptor.filter).await?;
        if page.skip() >= total {
            debug!(collection = collection.as_str(), page = page.page, total, "page out of range");
            return Err(AppError::NotFound("This page does not exist".into()));
        }
    }
    Ok(store.find(collection, descriptor).await?)
}
