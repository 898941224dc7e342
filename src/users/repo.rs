use serde_json::{json, Value};
use uuid::Uuid;

use crate::store::{decode, id_filter, Collection, DocumentStore, Patch, StoreError};
use crate::users::repo_types::{Role, User};

/// Deactivated accounts are invisible to every normal lookup.
pub fn active_scope() -> Value {
    json!({ "active": { "$ne": false } })
}

fn scoped(filter: Value) -> Value {
    json!({ "$and": [active_scope(), filter] })
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub photo: Option<&'a str>,
}

impl User {
    pub async fn find_by_id(store: &dyn DocumentStore, id: Uuid) -> Result<Option<User>, StoreError> {
        store
            .find_one(Collection::Users, &scoped(id_filter(id)))
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn find_by_email(store: &dyn DocumentStore, email: &str) -> Result<Option<User>, StoreError> {
        store
            .find_one(Collection::Users, &scoped(json!({ "email": email })))
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn create(store: &dyn DocumentStore, new: NewUser<'_>) -> Result<User, StoreError> {
        let mut doc = json!({
            "name": new.name,
            "email": new.email,
            "role": new.role,
            "password": new.password_hash,
            "active": true,
        });
        if let Some(photo) = new.photo {
            doc["photo"] = json!(photo);
        }
        decode(store.create(Collection::Users, doc).await?)
    }

    /// Applies `patch` to the first active user matching `filter` in one
    /// atomic step.
    pub async fn update_where(
        store: &dyn DocumentStore,
        filter: Value,
        patch: &Patch,
    ) -> Result<Option<User>, StoreError> {
        store
            .update_one(Collection::Users, &scoped(filter), patch)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn update(store: &dyn DocumentStore, id: Uuid, patch: &Patch) -> Result<Option<User>, StoreError> {
        Self::update_where(store, id_filter(id), patch).await
    }

    pub async fn delete(store: &dyn DocumentStore, id: Uuid) -> Result<bool, StoreError> {
        if Self::find_by_id(store, id).await?.is_none() {
            return Ok(false);
        }
        Ok(store.find_by_id_and_delete(Collection::Users, id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn seed(store: &MemoryStore, email: &str) -> User {
        User::create(
            store,
            NewUser {
                name: "Test User",
                email,
                password_hash: "hash",
                role: Role::User,
                photo: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn inactive_users_are_not_found() {
        let store = MemoryStore::new();
        let user = seed(&store, "gone@example.com").await;
        User::update(&store, user.id, &Patch::new().set("active", false)).await.unwrap();

        assert!(User::find_by_id(&store, user.id).await.unwrap().is_none());
        assert!(User::find_by_email(&store, "gone@example.com").await.unwrap().is_none());
        assert!(User::update(&store, user.id, &Patch::new().set("name", "x")).await.unwrap().is_none());
        assert!(!User::delete(&store, user.id).await.unwrap());
    }

    #[tokio::test]
    async fn create_defaults_and_round_trips() {
        let store = MemoryStore::new();
        let user = seed(&store, "new@example.com").await;
        assert_eq!(user.role, Role::User);
        let doc = store.find_by_id(Collection::Users, user.id).await.unwrap().unwrap();
        assert_eq!(doc["active"], true);
        let found = User::find_by_email(&store, "new@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.password.as_deref(), Some("hash"));
    }
}
