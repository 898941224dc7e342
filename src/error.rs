//! HTTP error taxonomy.
//!
//! Every failure leaving a handler is an [`AppError`] and is rendered as
//! `{ "status": "fail" | "error", "message": ... }`. Store and query errors
//! are translated here and nowhere else.

use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::{query::QueryError, state::AppState, store::StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("You are not logged in! Please log in to get access.")]
    Unauthenticated,

    #[error("Invalid token. Please log in again!")]
    InvalidToken,

    #[error("Your token has expired! Please log in again.")]
    TokenExpired,

    #[error("The user belonging to this token no longer exists.")]
    UserGone,

    #[error("User recently changed password! Please log in again.")]
    StalePassword,

    #[error("Incorrect email or password")]
    BadCredentials,

    #[error("Your current password is wrong.")]
    WrongPassword,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("Token is invalid or has expired")]
    InvalidOrExpiredToken,

    #[error("Duplicate field value: {0}. Please use another value!")]
    Conflict(String),

    #[error("Too many requests from this IP, please try again in an hour!")]
    TooManyRequests,

    #[error("There was an error sending the email. Try again later!")]
    MailDelivery(anyhow::Error),

    #[error("Something went very wrong!")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::InvalidOrExpiredToken => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthenticated
            | AppError::InvalidToken
            | AppError::TokenExpired
            | AppError::UserGone
            | AppError::StalePassword
            | AppError::BadCredentials
            | AppError::WrongPassword => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::MailDelivery(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("No {what} found with that ID"))
    }
}

/// Attached to every error response so [`error_detail`] can enrich it
/// outside production.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub status: StatusCode,
    pub message: String,
    pub detail: String,
}

fn envelope(status: StatusCode, message: &str) -> serde_json::Value {
    let label = if status.is_server_error() { "error" } else { "fail" };
    json!({ "status": label, "message": message })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let detail = match &self {
            AppError::Internal(e) | AppError::MailDelivery(e) => format!("{e:#}"),
            other => format!("{other:?}"),
        };

        if status.is_server_error() {
            error!(%status, error = %detail, "request failed");
        }

        let mut response = (status, Json(envelope(status, &message))).into_response();
        response.extensions_mut().insert(ErrorDetail { status, message, detail });
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey { fields, value } => {
                warn!(%fields, "duplicate key");
                AppError::Conflict(value)
            }
            StoreError::InvalidValue { field, value } => AppError::Validation(format!("Invalid {field}: {value}.")),
            StoreError::UnsupportedOperator(op) => AppError::Validation(format!("Unsupported filter operator: {op}")),
            StoreError::Malformed(msg) => AppError::Internal(anyhow::anyhow!("malformed document: {msg}")),
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Adds the underlying failure to error envelopes when not in production.
pub async fn error_detail(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if state.config.is_production() {
        return response;
    }
    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(detail) => {
            let mut body = envelope(detail.status, &detail.message);
            body["error"] = json!(detail.detail);
            let (parts, _) = response.into_parts();
            let mut enriched = (detail.status, Json(body)).into_response();
            for (name, value) in parts.headers.iter() {
                if name != axum::http::header::CONTENT_LENGTH && name != axum::http::header::CONTENT_TYPE {
                    enriched.headers_mut().append(name.clone(), value.clone());
                }
            }
            enriched
        }
        None => response,
    }
}

/// Router fallback for unmatched routes.
pub async fn route_not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(format!("Can't find {uri} on this server!"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn client_errors_render_as_fail() {
        let response = AppError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "You do not have permission to perform this action");
    }

    #[tokio::test]
    async fn internal_errors_hide_their_cause() {
        let response = AppError::Internal(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<ErrorDetail>().cloned().unwrap();
        assert!(detail.detail.contains("connection refused"));
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Something went very wrong!");
    }

    #[test]
    fn store_errors_map_onto_the_taxonomy() {
        let dup = AppError::from(StoreError::DuplicateKey {
            fields: "name".into(),
            value: "\"The Forest Hiker\"".into(),
        });
        assert_eq!(dup.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            dup.to_string(),
            "Duplicate field value: \"The Forest Hiker\". Please use another value!"
        );

        let cast = AppError::from(StoreError::InvalidValue {
            field: "id".into(),
            value: "abc".into(),
        });
        assert!(matches!(cast, AppError::Validation(ref m) if m == "Invalid id: abc."));

        let backend = AppError::from(StoreError::Backend(anyhow::anyhow!("boom")));
        assert_eq!(backend.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn session_failures_are_unauthorized() {
        for err in [
            AppError::Unauthenticated,
            AppError::InvalidToken,
            AppError::TokenExpired,
            AppError::UserGone,
            AppError::StalePassword,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
