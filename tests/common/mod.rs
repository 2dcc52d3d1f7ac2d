// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Query,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get as route_get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use portal_auth::config::{Config, SESSION_COOKIE};
use portal_auth::db::{FirestoreDb, IdentityStore, MemoryDb, SessionStore};
use portal_auth::error::{AppError, Result};
use portal_auth::models::{NewUser, ProfileUpdate, Role, SessionRecord, User};
use portal_auth::routes::create_router;
use portal_auth::services::credentials::hash_password;
use portal_auth::AppState;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app over in-memory stores.
/// Returns the router, the shared state and the backing store.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>, MemoryDb) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (Router, Arc<AppState>, MemoryDb) {
    let db = MemoryDb::new();
    let state = Arc::new(
        AppState::new(config, Arc::new(db.clone()), Arc::new(db.clone()))
            .expect("Failed to build app state"),
    );
    (create_router(state.clone()), state, db)
}

/// Create a test app over arbitrary stores (test doubles).
#[allow(dead_code)]
pub fn create_test_app_with_stores(
    config: Config,
    identity: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
) -> (Router, Arc<AppState>) {
    let state =
        Arc::new(AppState::new(config, identity, sessions).expect("Failed to build app state"));
    (create_router(state.clone()), state)
}

/// Insert a local user with a hashed password.
#[allow(dead_code)]
pub async fn seed_user(db: &dyn IdentityStore, username: &str, password: &str, role: Role) -> User {
    db.create_user(NewUser {
        username: username.to_string(),
        password_hash: Some(hash_password(password).unwrap()),
        role,
        tenant_id: 1,
        ..Default::default()
    })
    .await
    .unwrap()
}

/// `name=value` pair of the session cookie set by a response, if any.
#[allow(dead_code)]
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

/// Full `Set-Cookie` header for the session cookie.
#[allow(dead_code)]
pub fn session_set_cookie(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {SESSION_COOKIE}"))
        .to_string()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Session store whose writes always fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingSessionStore;

#[async_trait]
impl SessionStore for FailingSessionStore {
    async fn save(&self, _session: &SessionRecord) -> Result<()> {
        Err(AppError::StoreUnavailable("session table offline".to_string()))
    }

    async fn load(&self, _id: &str) -> Result<Option<SessionRecord>> {
        Ok(None)
    }

    async fn destroy(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }
}

/// Identity store that is unreachable.
#[allow(dead_code)]
#[derive(Default)]
pub struct UnavailableIdentityStore;

fn offline<T>() -> Result<T> {
    Err(AppError::StoreUnavailable("identity store offline".to_string()))
}

#[async_trait]
impl IdentityStore for UnavailableIdentityStore {
    async fn find_by_id(&self, _id: i64) -> Result<Option<User>> {
        offline()
    }

    async fn find_by_username(&self, _username: &str) -> Result<Option<User>> {
        offline()
    }

    async fn find_by_sso_id(&self, _sso_id: &str) -> Result<Option<User>> {
        offline()
    }

    async fn create_user(&self, _user: NewUser) -> Result<User> {
        offline()
    }

    async fn link_sso_id(&self, _id: i64, _sso_id: &str) -> Result<()> {
        offline()
    }

    async fn update_profile(&self, _id: i64, _update: &ProfileUpdate) -> Result<User> {
        offline()
    }

    async fn touch_last_login(&self, _id: i64, _at: DateTime<Utc>) -> Result<()> {
        offline()
    }
}

/// How long the mock IdP stalls on the `slow` token.
#[allow(dead_code)]
pub const SLOW_IDP_DELAY: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct UserInfoQuery {
    token: String,
}

/// Canned user-info answers keyed by token:
/// - `good` returns a full profile for subject `sso-1001`
/// - `partial` returns only a username and a full name
/// - `failed` returns a payload not marked as successful
/// - `garbage` returns a non-JSON body
/// - `slow` answers successfully, but only after [`SLOW_IDP_DELAY`]
/// - anything else returns 500
async fn userinfo(Query(query): Query<UserInfoQuery>) -> Response {
    match query.token.as_str() {
        "good" => Json(json!({
            "code": 200,
            "status": "success",
            "data": {
                "sub": "sso-1001",
                "username": "jdoe",
                "first_name": "Jane",
                "last_name": "Doe",
                "email": "jane.doe@corp.example",
                "profile_image_url": "https://cdn.example/jane.png",
                "tenantId": 7
            }
        }))
        .into_response(),
        "partial" => Json(json!({
            "status": "success",
            "data": { "username": "msmith", "name": "Mary Ann Smith" }
        }))
        .into_response(),
        "failed" => Json(json!({ "code": 401, "status": "error", "message": "expired" }))
            .into_response(),
        "garbage" => "<html>oops</html>".into_response(),
        "slow" => {
            tokio::time::sleep(SLOW_IDP_DELAY).await;
            Json(json!({
                "code": 200,
                "data": { "sub": "slow-1", "username": "slowpoke" }
            }))
            .into_response()
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Serve a throwaway IdP on an ephemeral port. Returns its base URL.
#[allow(dead_code)]
pub async fn spawn_mock_idp() -> String {
    let app = Router::new().route("/api/sso/userinfo", route_get(userinfo));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// Config pointing at a mock IdP.
#[allow(dead_code)]
pub fn config_with_idp(base: &str) -> Config {
    let mut config = Config::test_default();
    config.sso_server = base.to_string();
    config
}
