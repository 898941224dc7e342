use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub mod guard;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod reset_token;
pub mod services;

pub use guard::{AdminOnly, Authenticated, Authorized, ReviewAuthors, ReviewEditors, TourManagers, TourStaff};

/// Session routes, mounted under `/users`.
pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
