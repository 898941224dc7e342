use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{ReviewListResponse, ReviewResponse},
    repo_types::ReviewRequest,
    services,
};
use crate::{
    auth::{Authenticated, Authorized, ReviewAuthors, ReviewEditors},
    error::AppError,
    extract::{AppJson, AppPath, AppQuery, QueryPairs},
    state::AppState,
};

/// Mounted under `/reviews`. Every review route needs a session.
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route("/:id", get(get_review).patch(update_review).delete(delete_review))
}

/// Merged into the tours router as `/tours/:id/reviews`.
pub fn tour_review_routes() -> Router<AppState> {
    Router::new().route("/:id/reviews", get(list_tour_reviews).post(create_tour_review))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id()))]
pub async fn list_reviews(
    State(state): State<AppState>,
    identity: Authenticated,
    AppQuery(params): QueryPairs,
) -> Result<Json<ReviewListResponse>, AppError> {
    let reviews = services::list(&state, None, &params).await?;
    Ok(Json(ReviewListResponse::new(reviews)))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id()))]
pub async fn list_tour_reviews(
    State(state): State<AppState>,
    identity: Authenticated,
    AppPath(tour_id): AppPath<Uuid>,
    AppQuery(params): QueryPairs,
) -> Result<Json<ReviewListResponse>, AppError> {
    let reviews = services::list(&state, Some(tour_id), &params).await?;
    Ok(Json(ReviewListResponse::new(reviews)))
}

#[instrument(skip(state, identity), fields(user_id = %identity.id()))]
pub async fn get_review(
    State(state): State<AppState>,
    identity: Authenticated,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ReviewResponse>, AppError> {
    let review = services::get(&state, id).await?;
    Ok(Json(ReviewResponse::new(review)))
}

#[instrument(skip(state, author, payload))]
pub async fn create_review(
    State(state): State<AppState>,
    author: Authorized<ReviewAuthors>,
    AppJson(payload): AppJson<ReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), AppError> {
    let review = services::create_review(&state, author.identity(), None, payload).await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse::new(review))))
}

#[instrument(skip(state, author, payload))]
pub async fn create_tour_review(
    State(state): State<AppState>,
    author: Authorized<ReviewAuthors>,
    AppPath(tour_id): AppPath<Uuid>,
    AppJson(payload): AppJson<ReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), AppError> {
    let review = services::create_review(&state, author.identity(), Some(tour_id), payload).await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse::new(review))))
}

#[instrument(skip(state, editor, payload))]
pub async fn update_review(
    State(state): State<AppState>,
    editor: Authorized<ReviewEditors>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<ReviewRequest>,
) -> Result<Json<ReviewResponse>, AppError> {
    let review = services::update_review(&state, editor.identity(), id, payload).await?;
    Ok(Json(ReviewResponse::new(review)))
}

#[instrument(skip(state, editor))]
pub async fn delete_review(
    State(state): State<AppState>,
    editor: Authorized<ReviewEditors>,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_review(&state, editor.identity(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
