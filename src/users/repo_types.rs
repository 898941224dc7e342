use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{FieldKind, FieldSpec, ResourceSchema};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

/// User document as stored in the `users` collection. Reset-token fields and
/// the `active` flag stay in the document and are only used in store filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default)]
    pub role: Role,
    // argon2 PHC string, never serialized
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// True when the password changed after a token issued at `iat`
    /// (unix seconds).
    pub fn changed_password_after(&self, iat: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.unix_timestamp() > iat)
            .unwrap_or(false)
    }
}

pub static USER_SCHEMA: ResourceSchema = ResourceSchema {
    fields: &[
        FieldSpec::new("id", FieldKind::Id),
        FieldSpec::new("name", FieldKind::Text),
        FieldSpec::new("email", FieldKind::Text),
        FieldSpec::new("photo", FieldKind::Text),
        FieldSpec::new("role", FieldKind::Text),
        FieldSpec::new("passwordChangedAt", FieldKind::Date),
        FieldSpec::new("createdAt", FieldKind::Date),
    ],
    hidden: &["password", "passwordResetToken", "passwordResetExpires", "active"],
};
