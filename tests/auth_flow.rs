//! End-to-end tests for the authentication pipeline: registration, login,
//! the middleware chain, and the error envelope shape.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use careportal::api::{routes, ApiState};
use careportal::auth::models::{NewUser, Role, User, UserStatus};
use careportal::auth::TokenService;
use careportal::config::{AppConfig, AuthConfig, DatabaseConfig};
use careportal::domain::UserId;
use careportal::storage::{create_pool, migrations, SqlxUserRepository, UserRepository};

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn test_config(rate_limit_max_requests: u32) -> AppConfig {
    AppConfig {
        auth: AuthConfig {
            jwt_secret: SECRET.to_string(),
            token_ttl_secs: 3600,
            lookup_timeout_secs: 5,
            rate_limit_max_requests,
            rate_limit_window_secs: 60,
        },
        ..AppConfig::default()
    }
}

async fn app_with_limit(rate_limit_max_requests: u32) -> (Router, SqlxUserRepository) {
    let db = DatabaseConfig {
        url: "sqlite://:memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        auto_migrate: false,
        ..Default::default()
    };
    let pool = create_pool(&db).await.unwrap();
    migrations::run_migrations(&pool).await.unwrap();

    let repo = SqlxUserRepository::new(pool.clone());
    let state = ApiState::new(&test_config(rate_limit_max_requests), pool);
    (routes::build_router(state), repo)
}

async fn app() -> (Router, SqlxUserRepository) {
    app_with_limit(100).await
}

async fn seed_user(
    repo: &SqlxUserRepository,
    email: &str,
    role: Role,
    status: UserStatus,
    two_factor_enabled: bool,
) -> User {
    repo.create_user(NewUser {
        id: UserId::new(),
        email: email.to_string(),
        password_hash: "$argon2id$seeded$hash".to_string(),
        name: "Seeded User".to_string(),
        role,
        status,
        two_factor_enabled,
        two_factor_secret: two_factor_enabled.then(|| "JBSWY3DPEHPK3PXP".to_string()),
    })
    .await
    .unwrap()
}

fn issue_token(user: &User, ttl_secs: i64) -> String {
    TokenService::new(SECRET.as_bytes()).issue(user, ttl_secs).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn response_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn assert_envelope(body: &Value, path: &str, code: &str, message: &str) {
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!(code));
    assert_eq!(body["error"]["message"], json!(message));
    assert_eq!(body["path"], json!(path));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn register_activate_login_me_flow() {
    let (router, repo) = app().await;

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/register",
            json!({"email": "Pat@Example.com", "password": "SecureP@ssw0rd", "name": "Pat"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = response_json(response).await;
    assert_eq!(created["email"], json!("pat@example.com"));
    assert_eq!(created["status"], json!("pending-verification"));
    assert_eq!(created["role"], json!("patient"));

    // A pending account cannot log in yet.
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "pat@example.com", "password": "SecureP@ssw0rd"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let id = UserId::from_string(created["id"].as_str().unwrap().to_string());
    repo.update_status(&id, UserStatus::Active).await.unwrap();

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "pat@example.com", "password": "SecureP@ssw0rd"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let login = response_json(response).await;
    let token = login["token"].as_str().unwrap().to_string();
    assert_eq!(login["user"]["email"], json!("pat@example.com"));

    let response =
        router.clone().oneshot(get_request("/api/v1/auth/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = response_json(response).await;
    assert_eq!(me["email"], json!("pat@example.com"));
    assert!(me.get("passwordHash").is_none());
}

#[tokio::test]
async fn duplicate_registration_returns_conflict_envelope() {
    let (router, _repo) = app().await;
    let body = json!({"email": "dup@example.com", "password": "SecureP@ssw0rd", "name": "Dup"});

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/v1/auth/register", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response =
        router.clone().oneshot(json_request("POST", "/api/v1/auth/register", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let envelope = response_json(response).await;
    assert_envelope(
        &envelope,
        "/api/v1/auth/register",
        "CONFLICT",
        "A user with this email already exists",
    );
}

#[tokio::test]
async fn missing_invalid_and_expired_tokens_are_distinct() {
    let (router, repo) = app().await;
    let user = seed_user(&repo, "tok@example.com", Role::Doctor, UserStatus::Active, false).await;

    let response = router.clone().oneshot(get_request("/api/v1/auth/me", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let envelope = response_json(response).await;
    assert_envelope(
        &envelope,
        "/api/v1/auth/me",
        "UNAUTHORIZED",
        "No authentication token provided",
    );

    // Wrong scheme is treated as no token at all.
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/auth/me")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let envelope = response_json(response).await;
    assert_envelope(
        &envelope,
        "/api/v1/auth/me",
        "UNAUTHORIZED",
        "No authentication token provided",
    );

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/auth/me", Some("not.a.token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let envelope = response_json(response).await;
    assert_envelope(&envelope, "/api/v1/auth/me", "UNAUTHORIZED", "Invalid token");

    let expired = issue_token(&user, -60);
    let response =
        router.clone().oneshot(get_request("/api/v1/auth/me", Some(&expired))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let envelope = response_json(response).await;
    assert_envelope(&envelope, "/api/v1/auth/me", "UNAUTHORIZED", "Token expired");
}

#[tokio::test]
async fn suspended_account_is_rejected_despite_valid_token() {
    let (router, repo) = app().await;
    let user = seed_user(&repo, "gone@example.com", Role::Nurse, UserStatus::Active, false).await;
    let token = issue_token(&user, 3600);

    repo.update_status(&user.id, UserStatus::Suspended).await.unwrap();

    let response =
        router.clone().oneshot(get_request("/api/v1/auth/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let envelope = response_json(response).await;
    assert_envelope(&envelope, "/api/v1/auth/me", "UNAUTHORIZED", "User no longer exists");
}

#[tokio::test]
async fn token_issued_before_password_change_is_rejected() {
    let (router, repo) = app().await;
    let user = seed_user(&repo, "pwc@example.com", Role::Patient, UserStatus::Active, false).await;
    let token = issue_token(&user, 3600);

    // Recorded change is strictly after the token's issued-at second.
    let changed_at = Utc::now() + ChronoDuration::seconds(2);
    repo.update_password(&user.id, "$argon2id$rotated$hash".to_string(), changed_at)
        .await
        .unwrap();

    let response =
        router.clone().oneshot(get_request("/api/v1/auth/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let envelope = response_json(response).await;
    assert_envelope(
        &envelope,
        "/api/v1/auth/me",
        "UNAUTHORIZED",
        "User recently changed password. Please login again.",
    );
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let (router, repo) = app().await;
    let patient =
        seed_user(&repo, "pat2@example.com", Role::Patient, UserStatus::Active, false).await;
    let admin = seed_user(&repo, "adm@example.com", Role::Admin, UserStatus::Active, false).await;

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/users", Some(&issue_token(&patient, 3600))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let envelope = response_json(response).await;
    assert_envelope(
        &envelope,
        "/api/v1/users",
        "FORBIDDEN",
        "You do not have permission to perform this action",
    );

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/users", Some(&issue_token(&admin, 3600))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let users = response_json(response).await;
    assert_eq!(users.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn two_factor_accounts_must_present_verification_header() {
    let (router, repo) = app().await;
    let admin = seed_user(&repo, "2fa@example.com", Role::Admin, UserStatus::Active, true).await;
    let token = issue_token(&admin, 3600);

    let response =
        router.clone().oneshot(get_request("/api/v1/users", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let envelope = response_json(response).await;
    assert_envelope(
        &envelope,
        "/api/v1/users",
        "FORBIDDEN",
        "Two-factor authentication required",
    );

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/users")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header("X-2FA-Verified", "true")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_with_retry_after() {
    let (router, repo) = app_with_limit(3).await;
    let user = seed_user(&repo, "rl@example.com", Role::Doctor, UserStatus::Active, false).await;
    let token = issue_token(&user, 3600);

    for _ in 0..3 {
        let response =
            router.clone().oneshot(get_request("/api/v1/auth/me", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response =
        router.clone().oneshot(get_request("/api/v1/auth/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let envelope = response_json(response).await;
    assert_envelope(
        &envelope,
        "/api/v1/auth/me",
        "RATE_LIMIT",
        "Rate limit exceeded. Please try again later.",
    );
}

#[tokio::test]
async fn rate_limit_tracks_identities_independently() {
    let (router, repo) = app_with_limit(2).await;
    let a = seed_user(&repo, "a@example.com", Role::Nurse, UserStatus::Active, false).await;
    let b = seed_user(&repo, "b@example.com", Role::Nurse, UserStatus::Active, false).await;
    let token_a = issue_token(&a, 3600);
    let token_b = issue_token(&b, 3600);

    for _ in 0..2 {
        let response =
            router.clone().oneshot(get_request("/api/v1/auth/me", Some(&token_a))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response =
        router.clone().oneshot(get_request("/api/v1/auth/me", Some(&token_a))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response =
        router.clone().oneshot(get_request("/api/v1/auth/me", Some(&token_b))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_can_activate_pending_account() {
    let (router, repo) = app().await;
    let admin = seed_user(&repo, "boss@example.com", Role::Admin, UserStatus::Active, false).await;
    let token = issue_token(&admin, 3600);

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/register",
            json!({"email": "newdoc@example.com", "password": "SecureP@ssw0rd", "name": "Doc", "role": "doctor"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = response_json(response).await;
    let id = created["id"].as_str().unwrap();

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/v1/users/{}/status", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"status": "active"}).to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = response_json(response).await;
    assert_eq!(updated["status"], json!("active"));

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "newdoc@example.com", "password": "SecureP@ssw0rd"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn change_password_endpoint_rotates_credentials() {
    let (router, repo) = app().await;

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/register",
            json!({"email": "rot@example.com", "password": "SecureP@ssw0rd", "name": "Rot"}),
        ))
        .await
        .unwrap();
    let created = response_json(response).await;
    let id = UserId::from_string(created["id"].as_str().unwrap().to_string());
    repo.update_status(&id, UserStatus::Active).await.unwrap();

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "rot@example.com", "password": "SecureP@ssw0rd"}),
        ))
        .await
        .unwrap();
    let login = response_json(response).await;
    let token = login["token"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/change-password")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"currentPassword": "SecureP@ssw0rd", "newPassword": "BrandNewP@ss1"})
                .to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Old password is dead, the new one works.
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "rot@example.com", "password": "SecureP@ssw0rd"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "rot@example.com", "password": "BrandNewP@ss1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn error_responses_keep_cors_headers() {
    let (router, _repo) = app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/auth/me")
        .header(header::ORIGIN, "http://app.example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The envelope must not strip what the CORS layer added; a browser
    // client has to be able to read the error body cross-origin.
    assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));

    let envelope = response_json(response).await;
    assert_envelope(
        &envelope,
        "/api/v1/auth/me",
        "UNAUTHORIZED",
        "No authentication token provided",
    );
}

#[tokio::test]
async fn stray_method_mismatch_reports_unrecognized_error() {
    let (router, _repo) = app().await;

    // No taxonomy row covers a method mismatch; it surfaces as the generic
    // unrecognized-error kind with a matching status.
    let response =
        router.clone().oneshot(json_request("POST", "/health", json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let envelope = response_json(response).await;
    assert_eq!(envelope["success"], json!(false));
    assert_eq!(envelope["error"]["code"], json!("INTERNAL"));
    assert_eq!(envelope["error"]["message"], json!("Something went wrong!"));
}

#[tokio::test]
async fn unknown_route_gets_enveloped_not_found() {
    let (router, _repo) = app().await;

    let response = router.clone().oneshot(get_request("/api/v1/nope", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let envelope = response_json(response).await;
    assert_eq!(envelope["success"], json!(false));
    assert_eq!(envelope["error"]["code"], json!("NOT_FOUND"));
    assert_eq!(envelope["path"], json!("/api/v1/nope"));
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let (router, _repo) = app().await;

    let response = router.clone().oneshot(get_request("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], json!("ok"));

    let response =
        router.clone().oneshot(get_request("/api-docs/openapi.json", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
