use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue},
    middleware, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::error::{error_detail, route_not_found};
use crate::rate_limit::limit_requests;
use crate::state::AppState;
use crate::{reviews, tours, users};

const BODY_LIMIT_BYTES: usize = 10 * 1024;

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    ("x-dns-prefetch-control", "off"),
    ("cross-origin-opener-policy", "same-origin"),
];

fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/tours", tours::router())
        .nest("/users", users::router())
        .nest("/reviews", reviews::router())
        .layer(middleware::from_fn_with_state(state.clone(), limit_requests))
}

pub fn build_app(state: AppState) -> Router {
    let mut app = Router::new()
        .nest("/api/v1", api_routes(&state))
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(state.clone(), error_detail))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state);

    for (name, value) in SECURITY_HEADERS {
        app = app.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    app.layer(SetResponseHeaderLayer::if_not_present(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=15552000; includeSubDomains"),
    ))
    .layer(CorsLayer::permissive())
    .layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
            })
            .on_response(
                |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    if status.is_server_error() {
                        tracing::error!(%status, ?latency, "response");
                    } else {
                        tracing::info!(%status, ?latency, "response");
                    }
                },
            ),
    )
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;

    if state.limiter.is_enabled() {
        let limiter = state.limiter.clone();
        let period = Duration::from_secs(state.config.rate_limit.window_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                limiter.purge();
            }
        });
    }

    let app = build_app(state);
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, HeaderMap, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::jwt::JwtKeys;
    use crate::config::Environment;
    use crate::error::AppError;
    use crate::mail::RecordingMailer;
    use crate::store::Collection;
    use crate::users::{NewUser, Role, User};

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
    }

    async fn call(state: &AppState, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        send(build_app(state.clone()), req).await
    }

    async fn send(app: Router, req: Request<Body>) -> Reply {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply { status, headers, body }
    }

    async fn signup(state: &AppState, email: &str) -> Reply {
        let body = json!({
            "name": "Test Traveller",
            "email": email,
            "password": "pass1234",
            "passwordConfirm": "pass1234",
        });
        call(state, Method::POST, "/api/v1/users/signup", None, Some(body)).await
    }

    async fn token_for(state: &AppState, role: Role) -> String {
        let email = format!("{}@example.com", Uuid::new_v4());
        let user = User::create(
            state.store.as_ref(),
            NewUser {
                name: "Staff Member",
                email: &email,
                password_hash: "unused",
                role,
                photo: None,
            },
        )
        .await
        .unwrap();
        JwtKeys::new(&state.config.jwt).sign(user.id).unwrap()
    }

    fn tour_body(name: &str, price: f64) -> Value {
        json!({
            "name": name,
            "duration": 5,
            "maxGroupSize": 10,
            "difficulty": "easy",
            "price": price,
            "summary": "A short summary",
            "description": "A longer description",
            "imageCover": "cover.jpg",
        })
    }

    fn reset_token(body: &str) -> String {
        let start = body.find("resetPassword/").unwrap() + "resetPassword/".len();
        body[start..start + 64].to_string()
    }

    #[tokio::test]
    async fn unknown_routes_use_the_error_envelope() {
        let state = AppState::fake();
        let reply = call(&state, Method::GET, "/api/v1/nowhere", None, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body["status"], "fail");
        assert_eq!(reply.body["message"], "Can't find /api/v1/nowhere on this server!");
        assert_eq!(reply.headers["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn signup_issues_a_cookie_and_token_that_resolve_the_user() {
        let state = AppState::fake();
        let reply = signup(&state, "Traveller@Example.com").await;
        assert_eq!(reply.status, StatusCode::CREATED);
        let cookie = reply.headers["set-cookie"].to_str().unwrap();
        assert!(cookie.starts_with("jwt="));
        assert!(cookie.contains("HttpOnly"));
        assert!(reply.body["data"]["user"].get("password").is_none());

        let token = reply.body["token"].as_str().unwrap();
        let me = call(&state, Method::GET, "/api/v1/users/me", Some(token), None).await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.body["data"]["user"]["email"], "traveller@example.com");

        let anonymous = call(&state, Method::GET, "/api/v1/users/me", None, None).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let state = AppState::fake();
        signup(&state, "known@example.com").await;

        let wrong_password = call(
            &state,
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "email": "known@example.com", "password": "nope-nope" })),
        )
        .await;
        let unknown_email = call(
            &state,
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "email": "ghost@example.com", "password": "nope-nope" })),
        )
        .await;

        assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password.status, unknown_email.status);
        assert_eq!(wrong_password.body, unknown_email.body);
    }

    #[tokio::test]
    async fn deactivated_accounts_lose_their_session() {
        let state = AppState::fake();
        let reply = signup(&state, "leaving@example.com").await;
        let token = reply.body["token"].as_str().unwrap().to_string();

        let gone = call(&state, Method::DELETE, "/api/v1/users/deleteMe", Some(&token), None).await;
        assert_eq!(gone.status, StatusCode::NO_CONTENT);

        let me = call(&state, Method::GET, "/api/v1/users/me", Some(&token), None).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);
        assert_eq!(me.body["message"], "The user belonging to this token no longer exists.");
    }

    #[tokio::test]
    async fn tour_writes_are_restricted_by_role() {
        let state = AppState::fake();
        let user = token_for(&state, Role::User).await;
        let admin = token_for(&state, Role::Admin).await;

        let denied = call(&state, Method::POST, "/api/v1/tours", Some(&user), Some(tour_body("The Quiet Valley", 300.0))).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.body["message"], "You do not have permission to perform this action");

        let created = call(&state, Method::POST, "/api/v1/tours", Some(&admin), Some(tour_body("The Quiet Valley", 300.0))).await;
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.body["data"]["tour"]["slug"], "the-quiet-valley");

        let anonymous = call(&state, Method::POST, "/api/v1/tours", None, Some(tour_body("The Loud Valley", 300.0))).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn listing_pages_and_rejects_pages_past_the_end() {
        let state = AppState::fake();
        let admin = token_for(&state, Role::Admin).await;
        for (name, price) in [("The First Journey", 100.0), ("The Second Journey", 200.0), ("The Third Journey", 300.0)] {
            let reply = call(&state, Method::POST, "/api/v1/tours", Some(&admin), Some(tour_body(name, price))).await;
            assert_eq!(reply.status, StatusCode::CREATED);
        }

        let page = call(&state, Method::GET, "/api/v1/tours?sort=price&limit=2&page=2", None, None).await;
        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.body["results"], 1);
        assert_eq!(page.body["data"]["tours"][0]["name"], "The Third Journey");

        let cheap = call(&state, Method::GET, "/api/v1/tours?price%5Blt%5D=250&sort=-price", None, None).await;
        assert_eq!(cheap.body["results"], 2);
        assert_eq!(cheap.body["data"]["tours"][0]["price"], 200.0);

        let past = call(&state, Method::GET, "/api/v1/tours?limit=2&page=5", None, None).await;
        assert_eq!(past.status, StatusCode::NOT_FOUND);
        assert_eq!(past.body["message"], "This page does not exist");
    }

    #[tokio::test]
    async fn top_five_cheap_limits_and_projects() {
        let state = AppState::fake();
        let admin = token_for(&state, Role::Admin).await;
        for n in 0..6 {
            let name = format!("The Budget Tour {n}");
            call(&state, Method::POST, "/api/v1/tours", Some(&admin), Some(tour_body(&name, 100.0 + n as f64))).await;
        }

        let reply = call(&state, Method::GET, "/api/v1/tours/top-5-cheap?limit=50", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["results"], 5);
        let first = &reply.body["data"]["tours"][0];
        assert_eq!(first["price"], 100.0);
        assert!(first.get("description").is_none());
        assert!(first.get("maxGroupSize").is_none());
    }

    #[tokio::test]
    async fn password_reset_round_trip() {
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::fake_with_mailer(mailer.clone());
        signup(&state, "forgetful@example.com").await;

        let sent = call(
            &state,
            Method::POST,
            "/api/v1/users/forgotPassword",
            None,
            Some(json!({ "email": "forgetful@example.com" })),
        )
        .await;
        assert_eq!(sent.status, StatusCode::OK);
        assert_eq!(sent.body["message"], "Token sent to email!");
        let token = reset_token(&mailer.last().unwrap().body);

        let body = json!({ "password": "brand-new-pass", "passwordConfirm": "brand-new-pass" });
        let uri = format!("/api/v1/users/resetPassword/{token}");
        let reset = call(&state, Method::PATCH, &uri, None, Some(body.clone())).await;
        assert_eq!(reset.status, StatusCode::OK);
        assert!(reset.body["token"].is_string());

        let reused = call(&state, Method::PATCH, &uri, None, Some(body)).await;
        assert_eq!(reused.status, StatusCode::BAD_REQUEST);
        assert_eq!(reused.body["message"], "Token is invalid or has expired");

        let login = call(
            &state,
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "email": "forgetful@example.com", "password": "brand-new-pass" })),
        )
        .await;
        assert_eq!(login.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn failed_reset_mail_leaves_no_token_behind() {
        let mailer = Arc::new(RecordingMailer::default());
        mailer.fail(true);
        let state = AppState::fake_with_mailer(mailer);
        signup(&state, "unlucky@example.com").await;

        let reply = call(
            &state,
            Method::POST,
            "/api/v1/users/forgotPassword",
            None,
            Some(json!({ "email": "unlucky@example.com" })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body["status"], "error");
        assert_eq!(reply.body["message"], "There was an error sending the email. Try again later!");

        let stored = state
            .store
            .find_one(Collection::Users, &json!({ "email": "unlucky@example.com" }))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.get("passwordResetToken").is_none());
        assert!(stored.get("passwordResetExpires").is_none());
    }

    #[tokio::test]
    async fn malformed_bodies_are_validation_errors() {
        let state = AppState::fake();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/users/login")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = build_app(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reviews_flow_updates_tour_ratings() {
        let state = AppState::fake();
        let admin = token_for(&state, Role::Admin).await;
        let author = token_for(&state, Role::User).await;
        let created = call(&state, Method::POST, "/api/v1/tours", Some(&admin), Some(tour_body("The Review Trail", 450.0))).await;
        let tour_id = created.body["data"]["tour"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/tours/{tour_id}/reviews");
        let review = call(&state, Method::POST, &uri, Some(&author), Some(json!({ "review": "Loved it", "rating": 4 }))).await;
        assert_eq!(review.status, StatusCode::CREATED);
        assert_eq!(review.body["data"]["review"]["user"]["name"], "Staff Member");

        let by_admin = call(&state, Method::POST, &uri, Some(&admin), Some(json!({ "review": "Mine", "rating": 5 }))).await;
        assert_eq!(by_admin.status, StatusCode::FORBIDDEN);

        let tour = call(&state, Method::GET, &format!("/api/v1/tours/{tour_id}"), None, None).await;
        assert_eq!(tour.body["data"]["tour"]["ratingsQuantity"], 1);
        assert_eq!(tour.body["data"]["tour"]["ratingsAverage"], 4.0);
        assert_eq!(tour.body["data"]["tour"]["reviews"].as_array().unwrap().len(), 1);

        let listed = call(&state, Method::GET, &uri, Some(&author), None).await;
        assert_eq!(listed.body["results"], 1);
    }

    #[tokio::test]
    async fn rate_limit_rejects_excess_requests() {
        let fake = AppState::fake();
        let mut config = (*fake.config).clone();
        config.rate_limit.max_requests = 1;
        let state = AppState::from_parts(fake.store.clone(), Arc::new(config), fake.mailer.clone());

        let first = call(&state, Method::GET, "/api/v1/tours", None, None).await;
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.headers["x-ratelimit-remaining"], "0");

        let second = call(&state, Method::GET, "/api/v1/tours", None, None).await;
        assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.body["message"], "Too many requests from this IP, please try again in an hour!");
    }

    fn state_with(configure: impl FnOnce(&mut crate::config::AppConfig)) -> AppState {
        let fake = AppState::fake();
        let mut config = (*fake.config).clone();
        configure(&mut config);
        AppState::from_parts(fake.store.clone(), Arc::new(config), fake.mailer.clone())
    }

    #[tokio::test]
    async fn forwarded_headers_do_not_open_new_rate_limit_buckets() {
        let state = state_with(|c| c.rate_limit.max_requests = 1);

        let mut statuses = Vec::new();
        for n in 1..=3 {
            let spoofed = format!("203.0.113.{n}");
            let req = Request::builder()
                .uri("/api/v1/tours")
                .header("x-forwarded-for", spoofed.as_str())
                .header("x-real-ip", spoofed.as_str())
                .body(Body::empty())
                .unwrap();
            statuses.push(send(build_app(state.clone()), req).await.status);
        }
        assert_eq!(
            statuses,
            [StatusCode::OK, StatusCode::TOO_MANY_REQUESTS, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[tokio::test]
    async fn trusted_proxy_keys_on_the_forwarded_client() {
        let state = state_with(|c| {
            c.rate_limit.max_requests = 1;
            c.rate_limit.trust_proxy = true;
        });

        for client in ["203.0.113.1", "203.0.113.2"] {
            let req = Request::builder()
                .uri("/api/v1/tours")
                .header("x-forwarded-for", client)
                .body(Body::empty())
                .unwrap();
            assert_eq!(send(build_app(state.clone()), req).await.status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn error_detail_is_shown_only_outside_production() {
        let dev = call(&AppState::fake(), Method::GET, "/api/v1/users/me", None, None).await;
        assert_eq!(dev.status, StatusCode::UNAUTHORIZED);
        assert!(dev.body["error"].is_string());

        let prod_state = state_with(|c| c.environment = Environment::Production);
        let prod = call(&prod_state, Method::GET, "/api/v1/users/me", None, None).await;
        assert_eq!(prod.status, StatusCode::UNAUTHORIZED);
        assert_eq!(prod.body["status"], "fail");
        assert_eq!(prod.body["message"], "You are not logged in! Please log in to get access.");
        assert!(prod.body.get("error").is_none());

        let missing = call(&prod_state, Method::GET, "/api/v1/nowhere", None, None).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert!(missing.body.get("error").is_none());
    }

    #[tokio::test]
    async fn internal_failures_render_generically_in_production() {
        async fn broken() -> Result<(), AppError> {
            Err(AppError::Internal(anyhow::anyhow!("connection pool exhausted")))
        }
        let app_for = |state: AppState| {
            Router::new()
                .route("/broken", axum::routing::get(broken))
                .layer(middleware::from_fn_with_state(state.clone(), error_detail))
                .with_state(state)
        };
        let get = || Request::builder().uri("/broken").body(Body::empty()).unwrap();

        let prod = send(app_for(state_with(|c| c.environment = Environment::Production)), get()).await;
        assert_eq!(prod.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(prod.body, json!({ "status": "error", "message": "Something went very wrong!" }));

        let dev = send(app_for(AppState::fake()), get()).await;
        assert_eq!(dev.body["message"], "Something went very wrong!");
        assert_eq!(dev.body["error"], "connection pool exhausted");
    }
}
