mod dto;
pub mod geo;
pub mod handlers;
mod repo;
mod repo_types;
pub mod services;

use crate::{reviews, state::AppState};
use axum::Router;

pub use repo_types::{Tour, TourDraft, DEFAULT_RATINGS_AVERAGE};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
        .merge(reviews::nested_router())
}
