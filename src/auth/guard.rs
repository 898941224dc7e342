//! Request identity: `Anonymous -> Authenticated -> Authorized<P>`.
//!
//! [`Authenticated`] can only be obtained by verifying a session token and
//! [`Authorized`] can only be obtained from an [`Authenticated`], so a
//! handler that takes `Authorized<P>` cannot run before verification.

use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::jwt::{JwtKeys, TokenError};
use crate::{
    error::AppError,
    state::AppState,
    store::DocumentStore,
    users::{Role, User},
};

/// Proof that the request carried a valid, current session token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    user: User,
}

impl Authenticated {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn into_user(self) -> User {
        self.user
    }

    pub fn restrict_to(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.user.role) {
            Ok(())
        } else {
            warn!(user_id = %self.user.id, role = self.user.role.as_str(), "role not allowed");
            Err(AppError::Forbidden)
        }
    }

    pub fn authorize<P: RolePolicy>(self) -> Result<Authorized<P>, AppError> {
        self.restrict_to(P::ALLOWED)?;
        Ok(Authorized {
            identity: self,
            _policy: PhantomData,
        })
    }
}

/// Checks an `Authorization` header value and resolves its user.
pub async fn verify(
    keys: &JwtKeys,
    store: &dyn DocumentStore,
    header: Option<&str>,
) -> Result<Authenticated, AppError> {
    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthenticated)?;

    let claims = keys.verify(token).map_err(|e| match e {
        TokenError::Expired => AppError::TokenExpired,
        TokenError::Invalid => AppError::InvalidToken,
    })?;

    let user = User::find_by_id(store, claims.id).await?.ok_or_else(|| {
        warn!(user_id = %claims.id, "token for missing user");
        AppError::UserGone
    })?;

    if user.changed_password_after(claims.iat) {
        warn!(user_id = %user.id, "token predates password change");
        return Err(AppError::StalePassword);
    }

    debug!(user_id = %user.id, "request authenticated");
    Ok(Authenticated { user })
}

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(done) = parts.extensions.get::<Authenticated>() {
            return Ok(done.clone());
        }
        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let keys = JwtKeys::new(&state.config.jwt);
        let identity = verify(&keys, state.store.as_ref(), header).await?;
        parts.extensions.insert(identity.clone());
        Ok(identity)
    }
}

/// Allow-list of roles checked by [`Authorized`].
pub trait RolePolicy: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;
pub struct TourManagers;
pub struct TourStaff;
pub struct ReviewAuthors;
pub struct ReviewEditors;

impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

impl RolePolicy for TourManagers {
    const ALLOWED: &'static [Role] = &[Role::Admin, Role::LeadGuide];
}

impl RolePolicy for TourStaff {
    const ALLOWED: &'static [Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];
}

impl RolePolicy for ReviewAuthors {
    const ALLOWED: &'static [Role] = &[Role::User];
}

impl RolePolicy for ReviewEditors {
    const ALLOWED: &'static [Role] = &[Role::User, Role::Admin];
}

/// Authenticated identity whose role satisfies `P`.
pub struct Authorized<P> {
    identity: Authenticated,
    _policy: PhantomData<fn() -> P>,
}

impl<P> Authorized<P> {
    pub fn identity(&self) -> &Authenticated {
        &self.identity
    }
}

#[async_trait]
impl<P: RolePolicy> FromRequestParts<AppState> for Authorized<P> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Authenticated::from_request_parts(parts, state).await?.authorize::<P>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::store::{MemoryStore, Patch};
    use crate::users::NewUser;
    use time::{Duration, OffsetDateTime};

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "guard-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 60,
            cookie_ttl_days: 90,
        })
    }

    async fn user(store: &MemoryStore, role: Role) -> User {
        User::create(
            store,
            NewUser {
                name: "Guard Test",
                email: &format!("{}@example.com", Uuid::new_v4()),
                password_hash: "hash",
                role,
                photo: None,
            },
        )
        .await
        .unwrap()
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[tokio::test]
    async fn missing_or_foreign_scheme_is_unauthenticated() {
        let store = MemoryStore::new();
        let err = verify(&keys(), &store, None).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
        let err = verify(&keys(), &store, Some("Basic abc")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
        let err = verify(&keys(), &store, Some("Bearer ")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn bad_signature_is_invalid_token() {
        let store = MemoryStore::new();
        let err = verify(&keys(), &store, Some("Bearer abc.def.ghi")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn deleted_or_deactivated_user_is_gone() {
        let store = MemoryStore::new();
        let u = user(&store, Role::User).await;
        let token = keys().sign(u.id).unwrap();
        User::update(&store, u.id, &Patch::new().set("active", false)).await.unwrap();

        let err = verify(&keys(), &store, Some(&bearer(&token))).await.unwrap_err();
        assert!(matches!(err, AppError::UserGone));
    }

    #[tokio::test]
    async fn token_issued_before_password_change_is_stale() {
        let store = MemoryStore::new();
        let u = user(&store, Role::User).await;
        let now = OffsetDateTime::now_utc();
        let old = keys().sign_at(u.id, now - Duration::minutes(5)).unwrap();
        let changed = crate::store::timestamp(now).unwrap();
        User::update(&store, u.id, &Patch::new().set("passwordChangedAt", changed)).await.unwrap();

        let err = verify(&keys(), &store, Some(&bearer(&old))).await.unwrap_err();
        assert!(matches!(err, AppError::StalePassword));

        let one_second_before = keys().sign_at(u.id, now - Duration::seconds(1)).unwrap();
        let err = verify(&keys(), &store, Some(&bearer(&one_second_before))).await.unwrap_err();
        assert!(matches!(err, AppError::StalePassword));

        let fresh = keys().sign_at(u.id, now).unwrap();
        let ok = verify(&keys(), &store, Some(&bearer(&fresh))).await.unwrap();
        assert_eq!(ok.id(), u.id);
    }

    #[tokio::test]
    async fn restrict_to_checks_role_membership() {
        let store = MemoryStore::new();
        let guide = user(&store, Role::Guide).await;
        let token = keys().sign(guide.id).unwrap();
        let identity = verify(&keys(), &store, Some(&bearer(&token))).await.unwrap();

        assert!(matches!(identity.restrict_to(&[Role::Admin]), Err(AppError::Forbidden)));
        assert!(identity.clone().authorize::<AdminOnly>().is_err());
        assert!(identity.clone().authorize::<TourStaff>().is_ok());

        let admin = user(&store, Role::Admin).await;
        let token = keys().sign(admin.id).unwrap();
        let identity = verify(&keys(), &store, Some(&bearer(&token))).await.unwrap();
        assert!(identity.restrict_to(&[Role::Admin]).is_ok());
        let proof = identity.authorize::<AdminOnly>().unwrap();
        assert_eq!(proof.identity().id(), admin.id);
    }
}
