// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local and demo authentication routes.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::config::SESSION_COOKIE;
use crate::error::{AppError, Result};
use crate::middleware::auth::{found, wants_json};
use crate::models::SafeUser;
use crate::services::demo_login;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", get(logout))
        .route("/api/auth/demo-login", post(demo))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(length(min = 1, max = 1024))]
    pub password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

/// Password login.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SafeUser>)> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let username = request.username.trim();
    let user = state
        .credentials
        .verify(username, &request.password)
        .await
        .map_err(|e| match e {
            // Unknown users and wrong passwords look the same to the client.
            AppError::NotFound(_) => AppError::BadCredential,
            other => other,
        })?;

    let previous = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let bound = state.binder.replace(previous.as_deref(), &user).await?;
    tracing::info!(user_id = user.id, "Local login succeeded");

    Ok((
        jar.add(state.binder.cookie(bound.cookie_value)),
        Json(user.safe_projection()),
    ))
}

/// Current user for a valid session.
async fn me(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Json<SafeUser>> {
    let cookie = jar.get(SESSION_COOKIE).ok_or(AppError::Unauthorized)?;

    match state.binder.resolve(cookie.value()).await? {
        Some(user) => Ok(Json(user.safe_projection())),
        None => Err(AppError::Unauthorized),
    }
}

/// Destroy the session, then acknowledge.
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.binder.destroy(cookie.value()).await?;
    }
    let jar = jar.add(state.binder.removal_cookie());

    if wants_json(&headers) {
        Ok((
            jar,
            Json(MessageResponse {
                message: "Logged out successfully",
            }),
        )
            .into_response())
    } else {
        Ok((jar, found("/auth")).into_response())
    }
}

/// Log in as the seeded demo account without a password.
async fn demo(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SafeUser>)> {
    let user = demo_login(state.identity.as_ref(), &state.config.demo_username).await?;
    let previous = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let bound = state.binder.replace(previous.as_deref(), &user).await?;
    tracing::info!(user_id = user.id, "Demo login succeeded");

    Ok((
        jar.add(state.binder.cookie(bound.cookie_value)),
        Json(user.safe_projection()),
    ))
}
