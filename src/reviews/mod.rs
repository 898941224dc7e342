mod dto;
pub mod handlers;
mod repo;
mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::review_routes()
}

/// Review routes nested below a tour.
pub fn nested_router() -> Router<AppState> {
    handlers::tour_review_routes()
}
