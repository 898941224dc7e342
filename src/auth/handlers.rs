use axum::{
    extract::{FromRef, State},
    http::{header::HOST, HeaderMap, StatusCode},
    routing::{patch, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use tracing::instrument;

use super::{
    dto::{
        AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, ResetPasswordRequest, SignupRequest,
        UpdatePasswordRequest, UserData,
    },
    guard::Authenticated,
    jwt::JwtKeys,
    services,
};
use crate::{
    error::AppError,
    extract::{AppJson, AppPath},
    state::AppState,
    users::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/:token", patch(reset_password))
        .route("/updateMyPassword", patch(update_password))
}

type SessionReply = (StatusCode, CookieJar, Json<AuthResponse>);

fn send_token(state: &AppState, jar: CookieJar, status: StatusCode, user: User) -> Result<SessionReply, AppError> {
    let keys = JwtKeys::from_ref(state);
    let session = services::issue(&keys, user)?;
    let jar = jar.add(services::session_cookie(&state.config, session.token.clone()));
    Ok((
        status,
        jar,
        Json(AuthResponse {
            status: "success",
            token: session.token,
            data: UserData { user: session.user },
        }),
    ))
}

/// `<scheme>://<host>` of the incoming request, honouring a proxy's
/// `x-forwarded-proto`.
fn request_origin(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

#[instrument(skip(state, jar, payload))]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<SessionReply, AppError> {
    let user = services::signup(&state, payload).await?;
    send_token(&state, jar, StatusCode::CREATED, user)
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<SessionReply, AppError> {
    let user = services::login(&state, payload.email.as_deref(), payload.password.as_deref()).await?;
    send_token(&state, jar, StatusCode::OK, user)
}

#[instrument(skip(state, headers, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    services::forgot_password(&state, payload.email.as_deref(), &request_origin(&headers)).await?;
    Ok(Json(MessageResponse {
        status: "success",
        message: "Token sent to email!",
    }))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    AppPath(token): AppPath<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<SessionReply, AppError> {
    let user = services::reset_password(&state, &token, &payload.password, &payload.confirm_password).await?;
    send_token(&state, jar, StatusCode::OK, user)
}

#[instrument(skip_all, fields(user_id = %identity.id()))]
pub async fn update_password(
    State(state): State<AppState>,
    identity: Authenticated,
    jar: CookieJar,
    AppJson(payload): AppJson<UpdatePasswordRequest>,
) -> Result<SessionReply, AppError> {
    let user = services::update_password(&state, &identity, &payload).await?;
    send_token(&state, jar, StatusCode::OK, user)
}
