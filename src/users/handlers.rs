use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateUserRequest, UserList, UserListResponse, UserResponse},
    repo::active_scope,
    services,
};
use crate::{
    auth::{AdminOnly, Authenticated, Authorized},
    error::AppError,
    extract::{AppJson, AppPath, AppQuery, QueryPairs},
    query::{execute, ApiFeatures},
    state::AppState,
    store::Collection,
    users::{User, USER_SCHEMA},
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/updateMe", axum::routing::patch(update_me))
        .route("/deleteMe", axum::routing::delete(delete_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).patch(update_user).delete(delete_user))
}

#[instrument(skip_all, fields(user_id = %identity.id()))]
pub async fn get_me(identity: Authenticated) -> Json<UserResponse> {
    let mut user = identity.into_user();
    user.password = None;
    Json(UserResponse::new(user))
}

#[instrument(skip_all, fields(user_id = %identity.id()))]
pub async fn update_me(
    State(state): State<AppState>,
    identity: Authenticated,
    AppJson(payload): AppJson<Map<String, Value>>,
) -> Result<Json<UserResponse>, AppError> {
    let user = services::update_me(&state, &identity, payload).await?;
    Ok(Json(UserResponse::new(user)))
}

#[instrument(skip_all, fields(user_id = %identity.id()))]
pub async fn delete_me(State(state): State<AppState>, identity: Authenticated) -> Result<StatusCode, AppError> {
    services::deactivate(&state, &identity).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    AppQuery(params): QueryPairs,
) -> Result<Json<UserListResponse>, AppError> {
    let descriptor = ApiFeatures::build(active_scope(), &params, &USER_SCHEMA)?;
    let users = execute(state.store.as_ref(), Collection::Users, &descriptor).await?;
    Ok(Json(UserListResponse {
        status: "success",
        results: users.len(),
        data: UserList { users },
    }))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let user = User::find_by_id(state.store.as_ref(), id)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    Ok(Json(UserResponse::new(user)))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = services::create_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::new(user))))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<Map<String, Value>>,
) -> Result<Json<UserResponse>, AppError> {
    let user = services::update_user(&state, id, payload).await?;
    Ok(Json(UserResponse::new(user)))
}

#[instrument(skip(state, _admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    _admin: Authorized<AdminOnly>,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_user(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
