use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{FieldKind, FieldSpec, ResourceSchema};

/// Review document as stored in the `reviews` collection. `tour` and
/// `user` are ids; listings replace `user` with a short author record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub review: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub tour: Uuid,
    pub user: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Body of review create and update requests. A `user` field, if sent, is
/// ignored: reviews always belong to the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewRequest {
    pub review: Option<String>,
    pub rating: Option<f64>,
    pub tour: Option<Uuid>,
}

impl ReviewRequest {
    pub fn violations(&self, creating: bool) -> Vec<String> {
        let mut errors = Vec::new();
        match self.review.as_deref().map(str::trim) {
            Some("") => errors.push("Review cannot be empty.".to_string()),
            None if creating => errors.push("Review cannot be empty.".to_string()),
            _ => {}
        }
        if let Some(rating) = self.rating {
            if rating < 1.0 {
                errors.push("Rating must be at least 1.0".into());
            }
            if rating > 5.0 {
                errors.push("Rating must not be more than 5.0".into());
            }
        }
        errors
    }
}

pub static REVIEW_SCHEMA: ResourceSchema = ResourceSchema {
    fields: &[
        FieldSpec::new("id", FieldKind::Id),
        FieldSpec::new("review", FieldKind::Text),
        FieldSpec::new("rating", FieldKind::Number),
        FieldSpec::new("tour", FieldKind::Id),
        FieldSpec::new("user", FieldKind::Id),
        FieldSpec::new("createdAt", FieldKind::Date),
    ],
    hidden: &[],
};
