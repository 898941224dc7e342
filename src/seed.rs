//! Development data loading for the `import` and `delete` commands.

use std::path::Path;

use anyhow::Context;
use serde_json::json;
use tracing::info;

use crate::state::AppState;
use crate::store::Collection;
use crate::tours::{services::create_tour, TourDraft};

pub const DEFAULT_TOURS_FILE: &str = "dev-data/tours.json";

/// Loads tours from a JSON array. Each entry goes through the same
/// validation and defaults as `POST /tours`.
pub async fn import(state: &AppState, path: &Path) -> anyhow::Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let drafts: Vec<TourDraft> = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;

    let total = drafts.len();
    for (n, draft) in drafts.into_iter().enumerate() {
        let name = draft.name.clone().unwrap_or_default();
        create_tour(state, draft)
            .await
            .with_context(|| format!("tour #{} ({name})", n + 1))?;
    }
    info!(tours = total, file = %path.display(), "dev data imported");
    Ok(total)
}

/// Empties every collection.
pub async fn delete(state: &AppState) -> anyhow::Result<u64> {
    let mut removed = 0;
    for collection in [Collection::Reviews, Collection::Tours, Collection::Users] {
        let n = state.store.delete_many(collection, &json!({})).await?;
        info!(collection = collection.as_str(), removed = n, "collection cleared");
        removed += n;
    }
    Ok(removed)
}
