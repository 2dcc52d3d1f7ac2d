// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Invalid username or password")]
    BadCredential,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Neither an IdP token nor an external user id was supplied.
    #[error("No identity supplied by the identity provider")]
    NoIdentity,

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Identity provider unavailable: {0}")]
    IdpUnavailable(String),

    #[error("Identity store unavailable: {0}")]
    StoreUnavailable(String),

    /// A unique constraint (username or SSO subject) was violated.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("Concurrent reconciliation conflict: {0}")]
    ReconciliationConflict(String),

    #[error("Failed to persist session: {0}")]
    SessionPersist(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable code used in JSON bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::BadCredential => "bad_credential",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::NoIdentity => "no_identity",
            AppError::InvalidIdentity(_) => "invalid_identity",
            AppError::IdpUnavailable(_) => "idp_unavailable",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Conflict(_) => "conflict",
            AppError::ReconciliationConflict(_) => "reconciliation_conflict",
            AppError::SessionPersist(_) => "session_persist_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::BadCredential => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::NoIdentity | AppError::InvalidIdentity(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::IdpUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Conflict(_) | AppError::ReconciliationConflict(_) => StatusCode::CONFLICT,
            AppError::SessionPersist(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server-side detail stays in the logs.
        let message = match &self {
            AppError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Identity store unavailable");
                "Service temporarily unavailable".to_string()
            }
            AppError::SessionPersist(msg) => {
                tracing::error!(error = %msg, "Session persistence failed");
                "Login failed".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                "Internal server error".to_string()
            }
            AppError::Conflict(msg) | AppError::ReconciliationConflict(msg) => {
                tracing::warn!(error = %msg, "Identity conflict");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
