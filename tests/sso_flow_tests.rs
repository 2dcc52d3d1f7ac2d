// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SSO redirect, callback and logout tests against a mock identity provider.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use portal_auth::db::{IdentityStore, MemoryDb};
use portal_auth::models::Role;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

mod common;
use common::{
    body_json, config_with_idp, get_with_cookie, seed_user, session_cookie, spawn_mock_idp,
    SLOW_IDP_DELAY,
};

fn impatient_config(idp: &str) -> portal_auth::config::Config {
    let mut config = config_with_idp(idp);
    config.sso_timeout = Duration::from_millis(200);
    config
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

#[tokio::test]
async fn test_login_redirect_and_headers() {
    let (app, _, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sso/login")
                .header(header::HOST, "hr.example.com")
                .header("x-forwarded-proto", "https")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "http://127.0.0.1:9/api/sso/auth?redirect=https%3A%2F%2Fhr.example.com%2Fapi%2Fsso%2Fcallback"
    );

    let headers = response.headers();
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(headers[header::PRAGMA], "no-cache");
    assert_eq!(headers[header::EXPIRES], "0");
    // Route-specific frame policy survives the security header layer.
    assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
    assert_eq!(
        headers[header::CONTENT_SECURITY_POLICY],
        "frame-ancestors 'self';"
    );
}

#[tokio::test]
async fn test_callback_success_with_idp_claims() {
    let idp = spawn_mock_idp().await;
    let (app, _, db) = common::create_test_app_with_config(config_with_idp(&idp));

    let response = app
        .clone()
        .oneshot(common::get("/api/sso/callback?token=good"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response).expect("callback should set a session cookie");

    let user = db.find_by_sso_id("sso-1001").await.unwrap().unwrap();
    assert_eq!(user.username, "jdoe");
    assert_eq!(user.first_name.as_deref(), Some("Jane"));
    assert_eq!(user.email.as_deref(), Some("jane.doe@corp.example"));
    assert_eq!(user.avatar_url.as_deref(), Some("https://cdn.example/jane.png"));
    assert_eq!(user.tenant_id, 7);
    assert_eq!(user.role, Role::Employee);
    assert!(user.last_login.is_some());

    let me = app
        .oneshot(get_with_cookie("/api/auth/me", &cookie))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);
    let body = body_json(me).await;
    assert_eq!(body["ssoId"], "sso-1001");
    assert_eq!(body["username"], "jdoe");
}

#[tokio::test]
async fn test_repeated_callbacks_keep_one_row() {
    let idp = spawn_mock_idp().await;
    let (app, _, db) = common::create_test_app_with_config(config_with_idp(&idp));

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(common::get("/api/sso/callback?token=good"))
            .await
            .unwrap();
        assert_eq!(location(&response), "/");
    }

    assert_eq!(db.user_count(), 1);
    assert_eq!(db.session_count(), 3);
}

#[tokio::test]
async fn test_callback_links_existing_local_account() {
    let idp = spawn_mock_idp().await;
    let (app, _, db) = common::create_test_app_with_config(config_with_idp(&idp));
    let local = seed_user(&db, "jdoe", "pw", Role::Manager).await;

    let response = app
        .oneshot(common::get("/api/sso/callback?token=good"))
        .await
        .unwrap();
    assert_eq!(location(&response), "/");

    assert_eq!(db.user_count(), 1);
    let linked = db.find_by_id(local.id).await.unwrap().unwrap();
    assert_eq!(linked.sso_id.as_deref(), Some("sso-1001"));
    assert_eq!(linked.role, Role::Manager);
}

#[tokio::test]
async fn test_callback_partial_claims_derive_names() {
    let idp = spawn_mock_idp().await;
    let (app, _, db) = common::create_test_app_with_config(config_with_idp(&idp));

    let response = app
        .oneshot(common::get("/api/sso/callback?token=partial"))
        .await
        .unwrap();
    assert_eq!(location(&response), "/");

    let user = db.find_by_sso_id("msmith").await.unwrap().unwrap();
    assert_eq!(user.first_name.as_deref(), Some("Mary"));
    assert_eq!(user.last_name.as_deref(), Some("Ann Smith"));
    assert_eq!(user.email.as_deref(), Some("msmith@example.com"));
    assert_eq!(user.tenant_id, 1);
}

#[tokio::test]
async fn test_callback_bare_user_id() {
    let (app, _, db) = common::create_test_app();

    let response = app
        .oneshot(common::get("/api/sso/callback?userId=u42"))
        .await
        .unwrap();
    assert_eq!(location(&response), "/");

    let user = db.find_by_sso_id("u42").await.unwrap().unwrap();
    assert_eq!(user.username, "u42");
    assert_eq!(user.email.as_deref(), Some("u42@example.com"));
    assert_eq!(user.role, Role::Employee);
}

#[tokio::test]
async fn test_idp_failure_falls_back_to_user_id() {
    let idp = spawn_mock_idp().await;
    let (app, _, db) = common::create_test_app_with_config(config_with_idp(&idp));

    let response = app
        .oneshot(common::get("/api/sso/callback?token=boom&userId=u7"))
        .await
        .unwrap();

    assert_eq!(location(&response), "/");
    assert!(db.find_by_sso_id("u7").await.unwrap().is_some());
}

#[tokio::test]
async fn test_callback_error_codes() {
    let idp = spawn_mock_idp().await;
    let (app, _, db) = common::create_test_app_with_config(config_with_idp(&idp));

    let cases = [
        ("/api/sso/callback", "/auth?error=no_token"),
        ("/api/sso/callback?token=&userId=", "/auth?error=no_token"),
        ("/api/sso/callback?token=failed", "/auth?error=invalid_user_data"),
        ("/api/sso/callback?token=garbage", "/auth?error=invalid_user_data"),
        ("/api/sso/callback?token=boom", "/auth?error=auth_failed"),
    ];

    for (uri, expected) in cases {
        let response = app.clone().oneshot(common::get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
        assert_eq!(location(&response), expected, "{uri}");
        assert!(session_cookie(&response).is_none(), "{uri}");
    }

    assert_eq!(db.user_count(), 0);
}

#[tokio::test]
async fn test_unreachable_idp_is_auth_failed() {
    let (app, _, _) = common::create_test_app();

    let response = app
        .oneshot(common::get("/api/sso/callback?token=tok"))
        .await
        .unwrap();

    assert_eq!(location(&response), "/auth?error=auth_failed");
}

#[tokio::test]
async fn test_store_outage_is_upsert_failed() {
    let (app, _) = common::create_test_app_with_stores(
        portal_auth::config::Config::test_default(),
        Arc::new(common::UnavailableIdentityStore),
        Arc::new(MemoryDb::new()),
    );

    let response = app
        .oneshot(common::get("/api/sso/callback?userId=u42"))
        .await
        .unwrap();

    assert_eq!(location(&response), "/auth?error=upsert_failed");
}

#[tokio::test]
async fn test_session_save_failure_leaves_user_logged_out() {
    let db = MemoryDb::new();
    let (app, _) = common::create_test_app_with_stores(
        portal_auth::config::Config::test_default(),
        Arc::new(db.clone()),
        Arc::new(common::FailingSessionStore),
    );

    let response = app
        .clone()
        .oneshot(common::get("/api/sso/callback?userId=u42"))
        .await
        .unwrap();

    assert_eq!(location(&response), "/auth?error=session_save_error");
    assert!(session_cookie(&response).is_none());
    // Reconciliation still happened.
    assert!(db.find_by_sso_id("u42").await.unwrap().is_some());

    let me = app
        .oneshot(get_with_cookie("/api/auth/me", "portal_session=none"))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sso_logout_destroys_session_then_redirects() {
    let (app, _, db) = common::create_test_app();

    let response = app
        .clone()
        .oneshot(common::get("/api/sso/callback?userId=u42"))
        .await
        .unwrap();
    let cookie = session_cookie(&response).unwrap();
    assert_eq!(db.session_count(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/sso/logout")
                .header(header::HOST, "localhost:5000")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "http://127.0.0.1:9/api/sso/logout?redirect=http%3A%2F%2Flocalhost%3A5000%2Fauth"
    );
    assert_eq!(db.session_count(), 0);

    let me = app
        .oneshot(get_with_cookie("/api/auth/me", &cookie))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_idp_timeout_falls_back_to_user_id() {
    let idp = spawn_mock_idp().await;
    let (app, _, db) = common::create_test_app_with_config(impatient_config(&idp));

    let started = Instant::now();
    let response = app
        .oneshot(common::get("/api/sso/callback?token=slow&userId=u9"))
        .await
        .unwrap();

    assert!(started.elapsed() < SLOW_IDP_DELAY);
    assert_eq!(location(&response), "/");
    assert!(db.find_by_sso_id("u9").await.unwrap().is_some());
    assert!(db.find_by_sso_id("slow-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_idp_timeout_without_user_id_is_auth_failed() {
    let idp = spawn_mock_idp().await;
    let (app, _, db) = common::create_test_app_with_config(impatient_config(&idp));

    let started = Instant::now();
    let response = app
        .oneshot(common::get("/api/sso/callback?token=slow"))
        .await
        .unwrap();

    assert!(started.elapsed() < SLOW_IDP_DELAY);
    assert_eq!(location(&response), "/auth?error=auth_failed");
    assert_eq!(db.user_count(), 0);
}

#[tokio::test]
async fn test_unknown_forwarded_proto_is_ignored() {
    let (app, _, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sso/login")
                .header(header::HOST, "hr.example.com")
                .header("x-forwarded-proto", "javascript")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        location(&response),
        "http://127.0.0.1:9/api/sso/auth?redirect=http%3A%2F%2Fhr.example.com%2Fapi%2Fsso%2Fcallback"
    );
}

#[tokio::test]
async fn test_repeat_callback_replaces_previous_session() {
    let (app, _, db) = common::create_test_app();

    let first = app
        .clone()
        .oneshot(common::get("/api/sso/callback?userId=u42"))
        .await
        .unwrap();
    let first_cookie = session_cookie(&first).unwrap();

    let second = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/sso/callback?userId=u42")
                .header(header::COOKIE, &first_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(location(&second), "/");
    let second_cookie = session_cookie(&second).unwrap();
    assert_eq!(db.session_count(), 1);

    let me = app
        .clone()
        .oneshot(get_with_cookie("/api/auth/me", &first_cookie))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);

    let me = app
        .oneshot(get_with_cookie("/api/auth/me", &second_cookie))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);
}
