use axum_extra::extract::cookie::{Cookie, SameSite};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use super::{
    dto::{SignupRequest, UpdatePasswordRequest},
    guard::Authenticated,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    reset_token::{self, RESET_TOKEN_TTL},
};
use crate::{
    config::AppConfig,
    error::AppError,
    mail::MailMessage,
    state::AppState,
    store::{id_filter, timestamp, Patch},
    users::{NewUser, Role, User},
};

pub const SESSION_COOKIE: &str = "jwt";
pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_new_password(password: &str, confirm: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password != confirm {
        return Err(AppError::Validation("Passwords are not the same".into()));
    }
    Ok(())
}

/// A freshly signed session for `user`, whose password hash has been
/// dropped.
pub struct Session {
    pub token: String,
    pub user: User,
}

pub fn issue(keys: &JwtKeys, mut user: User) -> Result<Session, AppError> {
    let token = keys.sign(user.id).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        AppError::Internal(e)
    })?;
    user.password = None;
    Ok(Session { token, user })
}

pub fn session_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::days(config.jwt.cookie_ttl_days))
        .build()
}

/// Written on every password change. Stored at whole seconds, so a token
/// issued later in the same second still verifies.
fn password_changed_now() -> Result<serde_json::Value, AppError> {
    Ok(timestamp(OffsetDateTime::now_utc())?)
}

pub async fn signup(state: &AppState, req: SignupRequest) -> Result<User, AppError> {
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
            role: Role::User,
            photo: req.photo.as_deref(),
        },
    )
    .await?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok(user)
}

pub async fn login(state: &AppState, email: Option<&str>, password: Option<&str>) -> Result<User, AppError> {
    let (Some(email), Some(password)) = (email, password) else {
        return Err(AppError::Validation("Please provide email and password!".into()));
    };
    let email = normalize_email(email);

    let user = User::find_by_email(state.store.as_ref(), &email).await?;
    let verified = match user.as_ref().and_then(|u| u.password.as_deref()) {
        Some(hash) => verify_password(password, hash)?,
        None => false,
    };

    match user {
        Some(user) if verified => {
            info!(user_id = %user.id, "user logged in");
            Ok(user)
        }
        _ => {
            warn!(email = %email, "login rejected");
            Err(AppError::BadCredentials)
        }
    }
}

/// Stores a reset fingerprint for the user and mails the plain token.
/// If the mail cannot be sent the fingerprint is removed again.
pub async fn forgot_password(state: &AppState, email: Option<&str>, base_url: &str) -> Result<(), AppError> {
    let email = normalize_email(email.unwrap_or_default());
    let store = state.store.as_ref();

    let user = User::find_by_email(store, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with that email address.".into()))?;

    let token = reset_token::generate();
    let expires = timestamp(OffsetDateTime::now_utc() + RESET_TOKEN_TTL)?;
    let patch = Patch::new()
        .set("passwordResetToken", token.fingerprint.clone())
        .set("passwordResetExpires", expires);
    User::update(store, user.id, &patch).await?;

    let url = format!("{base_url}/api/v1/users/resetPassword/{}", token.plain);
    let message = MailMessage {
        to: user.email.clone(),
        subject: "Your password reset token (valid for 10 min)".into(),
        body: format!(
            "Forgot your password? Submit a PATCH request with your new password and confirmPassword to: {url}.\n\
             If you didn't forget your password, please ignore this email!"
        ),
    };

    if let Err(e) = state.mailer.send(message).await {
        error!(error = %e, user_id = %user.id, "reset email failed; clearing token");
        let rollback = Patch::new().unset("passwordResetToken").unset("passwordResetExpires");
        User::update_where(store, json!({ "id": user.id, "passwordResetToken": token.fingerprint }), &rollback)
            .await?;
        return Err(AppError::MailDelivery(e));
    }

    info!(user_id = %user.id, "password reset token sent");
    Ok(())
}

/// Consumes a reset token in a single conditional update.
pub async fn reset_password(state: &AppState, token: &str, password: &str, confirm: &str) -> Result<User, AppError> {
    validate_new_password(password, confirm)?;
    let now = timestamp(OffsetDateTime::now_utc())?;
    let filter = json!({
        "passwordResetToken": reset_token::fingerprint(token),
        "passwordResetExpires": { "$gt": now },
    });

    let patch = Patch::new()
        .set("password", hash_password(password)?)
        .set("passwordChangedAt", password_changed_now()?)
        .unset("passwordResetToken")
        .unset("passwordResetExpires");

    let user = User::update_where(state.store.as_ref(), filter, &patch)
        .await?
        .ok_or(AppError::InvalidOrExpiredToken)?;
    info!(user_id = %user.id, "password reset");
    Ok(user)
}

/// Replaces the password of the authenticated user after checking the
/// current one. The write only lands if the stored hash is unchanged.
pub async fn update_password(
    state: &AppState,
    identity: &Authenticated,
    req: &UpdatePasswordRequest,
) -> Result<User, AppError> {
    let current_hash = identity.user().password.clone().unwrap_or_default();
    if current_hash.is_empty() || !verify_password(&req.password, &current_hash)? {
        warn!(user_id = %identity.id(), "current password mismatch");
        return Err(AppError::WrongPassword);
    }
    validate_new_password(&req.new_password, &req.confirm_password)?;

    let patch = Patch::new()
        .set("password", hash_password(&req.new_password)?)
        .set("passwordChangedAt", password_changed_now()?);
    let mut filter = id_filter(identity.id());
    filter["password"] = json!(current_hash);

    let user = User::update_where(state.store.as_ref(), filter, &patch)
        .await?
        .ok_or(AppError::WrongPassword)?;
    info!(user_id = %user.id, "password updated");
    Ok(user)
}
