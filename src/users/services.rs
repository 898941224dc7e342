use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use super::dto::CreateUserRequest;
use crate::{
    auth::{
        password::hash_password,
        services::{is_valid_email, normalize_email, validate_new_password},
        Authenticated,
    },
    error::AppError,
    state::AppState,
    store::Patch,
    users::{NewUser, Role, User},
};

const PASSWORD_FIELDS: [&str; 4] = ["password", "confirmPassword", "passwordConfirm", "newPassword"];
const PROFILE_FIELDS: [&str; 3] = ["name", "email", "photo"];
const ADMIN_FIELDS: [&str; 4] = ["name", "email", "photo", "role"];

/// Keeps only `allowed` keys of an update body and checks their values.
/// Unknown keys are dropped; password fields are rejected.
fn filter_update(body: Map<String, Value>, allowed: &[&str]) -> Result<Patch, AppError> {
    if body.keys().any(|k| PASSWORD_FIELDS.contains(&k.as_str())) {
        return Err(AppError::Validation(
            "This route is not for password updates. Please use /updateMyPassword.".into(),
        ));
    }

    let mut patch = Patch::new();
    for (key, value) in body.into_iter().filter(|(k, _)| allowed.contains(&k.as_str())) {
        match key.as_str() {
            "name" => {
                let name = value.as_str().map(str::trim).unwrap_or_default();
                if name.is_empty() {
                    return Err(AppError::Validation("You must provide your name".into()));
                }
                patch = patch.set("name", name);
            }
            "email" => {
                let email = value.as_str().map(normalize_email).unwrap_or_default();
                if !is_valid_email(&email) {
                    return Err(AppError::Validation("Please provide a valid email".into()));
                }
                patch = patch.set("email", email);
            }
            "role" => {
                let role: Role = serde_json::from_value(value.clone())
                    .map_err(|_| AppError::Validation(format!("Invalid role: {value}.")))?;
                patch = patch.set("role", role.as_str());
            }
            "photo" => match value {
                Value::Null => patch = patch.unset("photo"),
                Value::String(photo) => patch = patch.set("photo", photo),
                other => return Err(AppError::Validation(format!("Invalid photo: {other}."))),
            },
            _ => {}
        }
    }
    Ok(patch)
}

async fn apply(state: &AppState, id: Uuid, patch: Patch) -> Result<User, AppError> {
    let store = state.store.as_ref();
    let updated = if patch.is_empty() {
        User::find_by_id(store, id).await?
    } else {
        User::update(store, id, &patch).await?
    };
    updated.ok_or_else(|| AppError::not_found("user"))
}

pub async fn update_me(state: &AppState, identity: &Authenticated, body: Map<String, Value>) -> Result<User, AppError> {
    let patch = filter_update(body, &PROFILE_FIELDS)?;
    let user = apply(state, identity.id(), patch).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

/// Soft delete: the account stays stored but every lookup skips it.
pub async fn deactivate(state: &AppState, identity: &Authenticated) -> Result<(), AppError> {
    User::update(state.store.as_ref(), identity.id(), &Patch::new().set("active", false))
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    info!(user_id = %identity.id(), "account deactivated");
    Ok(())
}

pub async fn create_user(state: &AppState, req: CreateUserRequest) -> Result<User, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("You must provide your name".into()));
    }
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Please provide a valid email".into()));
    }
    validate_new_password(&req.password, &req.confirm_password)?;

    let hash = hash_password(&req.password)?;
    let user = User::create(
        state.store.as_ref(),
        NewUser {
            name,
            email: &email,
            password_hash: &hash,
            role: req.role,
            photo: req.photo.as_deref(),
        },
    )
    .await?;
    info!(user_id = %user.id, role = user.role.as_str(), "user created by admin");
    Ok(user)
}

pub async fn update_user(state: &AppState, id: Uuid, body: Map<String, Value>) -> Result<User, AppError> {
    let patch = filter_update(body, &ADMIN_FIELDS)?;
    apply(state, id, patch).await
}

pub async fn delete_user(state: &AppState, id: Uuid) -> Result<(), AppError> {
    if !User::delete(state.store.as_ref(), id).await? {
        return Err(AppError::not_found("user"));
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}
