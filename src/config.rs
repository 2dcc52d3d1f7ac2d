// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The identity provider location, the session secret and the persistence
//! target are all supplied externally; nothing here is derived at runtime.

use std::env;
use std::time::Duration;

/// Session lifetime (7 days).
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "portal_session";

/// Minimum accepted length of `SESSION_SECRET`.
const MIN_SESSION_SECRET_LEN: usize = 32;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the SSO server (without the `/api/sso` suffix)
    pub sso_server: String,
    /// Timeout for calls to the SSO user-info endpoint
    pub sso_timeout: Duration,
    /// HMAC key for session cookie signatures (raw bytes)
    pub session_secret: Vec<u8>,
    /// GCP project backing Firestore; `None` selects the in-memory store
    pub gcp_project_id: Option<String>,
    /// Server port
    pub port: u16,
    /// Production mode (secure cookies)
    pub production: bool,
    /// Username of the seeded demo account
    pub demo_username: String,
    /// Password for the demo account; seeding is skipped when unset
    pub demo_password: Option<String>,
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            sso_server: "http://127.0.0.1:9".to_string(),
            sso_timeout: Duration::from_secs(2),
            session_secret: b"test_session_secret_32_bytes_min!".to_vec(),
            gcp_project_id: None,
            port: 5000,
            production: false,
            demo_username: "demo_admin".to_string(),
            demo_password: None,
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let session_secret = env::var("SESSION_SECRET")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::Invalid(
                "SESSION_SECRET",
                format!("must be at least {MIN_SESSION_SECRET_LEN} bytes"),
            ));
        }

        let sso_timeout_secs = match env::var("SSO_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::Invalid("SSO_TIMEOUT_SECS", e.to_string()))?,
            Err(_) => 5,
        };

        Ok(Self {
            sso_server: env::var("SSO_SERVER")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:5001".to_string()),
            sso_timeout: Duration::from_secs(sso_timeout_secs),
            session_secret: session_secret.into_bytes(),
            gcp_project_id: env::var("GCP_PROJECT_ID")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            production: env::var("APP_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            demo_username: env::var("DEMO_USERNAME").unwrap_or_else(|_| "demo_admin".to_string()),
            demo_password: env::var("DEMO_PASSWORD").ok().filter(|v| !v.is_empty()),
        })
    }

    /// IdP authorization endpoint.
    pub fn sso_auth_url(&self) -> String {
        format!("{}/api/sso/auth", self.sso_server)
    }

    /// IdP user-info endpoint.
    pub fn sso_userinfo_url(&self) -> String {
        format!("{}/api/sso/userinfo", self.sso_server)
    }

    /// IdP logout endpoint.
    pub fn sso_logout_url(&self) -> String {
        format!("{}/api/sso/logout", self.sso_server)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
