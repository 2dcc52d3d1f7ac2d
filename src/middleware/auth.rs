// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session authentication and role gates.
//!
//! A gate is a plain function from the resolved principal to a [`Decision`].
//! Routes are protected by an ordered slice of gates; the first rejection
//! wins. JSON clients get a structured 401/403, browsers get a redirect.

use crate::config::SESSION_COOKIE;
use crate::error::AppError;
use crate::models::{Role, User};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Authenticated user inserted into request extensions by [`enforce`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unauthorized,
    Forbidden,
}

/// Outcome of a single gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Reject(Rejection),
}

pub type Gate = fn(Option<&AuthUser>) -> Decision;

pub fn authenticated(user: Option<&AuthUser>) -> Decision {
    match user {
        Some(_) => Decision::Continue,
        None => Decision::Reject(Rejection::Unauthorized),
    }
}

fn role_in(user: Option<&AuthUser>, roles: &[Role]) -> Decision {
    match user {
        None => Decision::Reject(Rejection::Unauthorized),
        Some(u) if roles.contains(&u.role) => Decision::Continue,
        Some(_) => Decision::Reject(Rejection::Forbidden),
    }
}

pub fn admin(user: Option<&AuthUser>) -> Decision {
    role_in(user, &[Role::Admin])
}

pub fn admin_or_manager(user: Option<&AuthUser>) -> Decision {
    role_in(user, &[Role::Admin, Role::Manager])
}

pub const REQUIRE_AUTHENTICATED: &[Gate] = &[authenticated];
pub const REQUIRE_ADMIN: &[Gate] = &[authenticated, admin];
pub const REQUIRE_ADMIN_OR_MANAGER: &[Gate] = &[authenticated, admin_or_manager];

/// Run gates in order; the first rejection wins.
pub fn evaluate(gates: &[Gate], user: Option<&AuthUser>) -> Decision {
    gates
        .iter()
        .map(|gate| gate(user))
        .find(|d| *d != Decision::Continue)
        .unwrap_or(Decision::Continue)
}

/// Whether the caller declared it accepts JSON responses.
pub fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}

/// 302 Found to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn reject(rejection: Rejection, json: bool) -> Response {
    match (rejection, json) {
        (Rejection::Unauthorized, true) => AppError::Unauthorized.into_response(),
        (Rejection::Forbidden, true) => AppError::Forbidden.into_response(),
        (Rejection::Unauthorized, false) => found("/auth"),
        (Rejection::Forbidden, false) => found("/dashboard"),
    }
}

/// Middleware state: the app plus the gates guarding this router.
#[derive(Clone)]
pub struct GateState {
    pub app: Arc<AppState>,
    pub gates: &'static [Gate],
}

/// Resolve the session principal and apply the configured gates.
pub async fn enforce(
    State(gate): State<GateState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => gate.app.binder.resolve(cookie.value()).await?,
        None => None,
    };
    let principal = user.as_ref().map(AuthUser::from);

    match evaluate(gate.gates, principal.as_ref()) {
        Decision::Continue => {
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            Ok(next.run(request).await)
        }
        Decision::Reject(rejection) => {
            tracing::debug!(
                ?rejection,
                path = %request.uri().path(),
                user_id = principal.as_ref().map(|p| p.id),
                "Request rejected by access gate"
            );
            Ok(reject(rejection, wants_json(request.headers())))
        }
    }
}

/// Protect every route of `router` with `gates`.
pub fn gate(
    router: Router<Arc<AppState>>,
    state: &Arc<AppState>,
    gates: &'static [Gate],
) -> Router<Arc<AppState>> {
    router.route_layer(middleware::from_fn_with_state(
        GateState {
            app: state.clone(),
            gates,
        },
        enforce,
    ))
}
