mod dto;
pub mod handlers;
mod repo;
mod repo_types;
mod services;

use crate::{auth, state::AppState};
use axum::Router;

pub use repo::NewUser;
pub use repo_types::{Role, User, USER_SCHEMA};

/// Everything under `/users`: session flows, the caller's own account and
/// admin management.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(handlers::me_routes())
        .merge(handlers::admin_routes())
}
