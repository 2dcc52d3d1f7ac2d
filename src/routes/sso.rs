// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SSO federation routes.
//!
//! Every failure on these routes ends in a redirect to the login page with a
//! machine-readable `error` code instead of a JSON error.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::SESSION_COOKIE;
use crate::error::{AppError, Result};
use crate::middleware::auth::found;
use crate::services::RequestOrigin;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sso/login", get(login))
        .route("/api/sso/callback", get(callback))
        .route("/api/sso/logout", get(logout))
}

/// Redirect to the IdP authorization endpoint.
async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap, uri: Uri) -> Response {
    let origin = RequestOrigin::from_request(&headers, &uri);
    let target = state.sso.login_redirect(&origin);
    tracing::info!(callback = %origin.callback_url(), "Redirecting to SSO server");

    let mut response = found(&target);
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("frame-ancestors 'self';"),
    );
    response
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
}

/// Redirect code for a failed claims exchange.
fn claims_error_code(error: &AppError) -> &'static str {
    match error {
        AppError::NoIdentity => "no_token",
        AppError::InvalidIdentity(_) => "invalid_user_data",
        _ => "auth_failed",
    }
}

/// Redirect code for a failed session bind.
fn session_error_code(error: &AppError) -> &'static str {
    match error {
        AppError::SessionPersist(_) => "session_save_error",
        _ => "session_error",
    }
}

fn fail(code: &str) -> Response {
    found(&format!("/auth?error={code}"))
}

/// Complete an SSO login: claims, reconciliation, then session.
async fn callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    tracing::info!(
        has_token = params.token.is_some(),
        user_id = params.user_id.as_deref(),
        "SSO callback received"
    );

    let claims = match state
        .sso
        .complete_callback(params.token.as_deref(), params.user_id.as_deref())
        .await
    {
        Ok(claims) => claims,
        Err(e) => {
            let code = claims_error_code(&e);
            tracing::warn!(error = %e, code, "SSO callback rejected");
            return fail(code);
        }
    };

    let user = match state.reconciler.reconcile(&claims).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, subject = %claims.subject, "User reconciliation failed");
            return fail("upsert_failed");
        }
    };

    let previous = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let bound = match state.binder.replace(previous.as_deref(), &user).await {
        Ok(bound) => bound,
        Err(e) => {
            let code = session_error_code(&e);
            tracing::error!(error = %e, user_id = user.id, code, "Session bind failed");
            return fail(code);
        }
    };

    tracing::info!(user_id = user.id, "SSO login succeeded");
    (jar.add(state.binder.cookie(bound.cookie_value)), found("/")).into_response()
}

/// Destroy the local session, then hand the browser to the IdP logout.
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
) -> Result<Response> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.binder.destroy(cookie.value()).await?;
    }
    let jar = jar.add(state.binder.removal_cookie());

    let origin = RequestOrigin::from_request(&headers, &uri);
    Ok((jar, found(&state.sso.logout_redirect(&origin))).into_response())
}
