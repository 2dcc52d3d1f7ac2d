// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SSO federation client.
//!
//! Handles:
//! - Building the IdP authorization and logout redirects for the current origin
//! - Exchanging a callback token for profile claims
//! - Falling back to minimal claims when only a bare user id came back

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Claims, UserInfoResponse};
use anyhow::Context;
use axum::http::{header, HeaderMap, Uri};

fn is_web_scheme(scheme: &str) -> bool {
    matches!(scheme, "http" | "https")
}

/// Scheme and host the current request was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub host: String,
}

impl RequestOrigin {
    /// Derive the origin from request headers, honoring `X-Forwarded-Proto`
    /// from a reverse proxy.
    pub fn from_request(headers: &HeaderMap, uri: &Uri) -> Self {
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| is_web_scheme(v))
            .or_else(|| {
                uri.scheme_str()
                    .map(str::to_ascii_lowercase)
                    .filter(|v| is_web_scheme(v))
            })
            .unwrap_or_else(|| "http".to_string());

        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        Self { scheme, host }
    }

    pub fn base(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Where the IdP should send the browser after authentication.
    pub fn callback_url(&self) -> String {
        format!("{}/api/sso/callback", self.base())
    }
}

/// Client for the external SSO server.
#[derive(Clone)]
pub struct SsoClient {
    http: reqwest::Client,
    auth_url: String,
    userinfo_url: String,
    logout_url: String,
}

impl SsoClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.sso_timeout)
            .build()
            .context("failed building SSO HTTP client")?;

        tracing::info!(sso_server = %config.sso_server, "Initialized SSO client");

        Ok(Self {
            http,
            auth_url: config.sso_auth_url(),
            userinfo_url: config.sso_userinfo_url(),
            logout_url: config.sso_logout_url(),
        })
    }

    /// IdP authorization URL carrying our callback as `redirect`.
    pub fn login_redirect(&self, origin: &RequestOrigin) -> String {
        format!(
            "{}?redirect={}",
            self.auth_url,
            urlencoding::encode(&origin.callback_url())
        )
    }

    /// IdP logout URL that returns the browser to our login page.
    pub fn logout_redirect(&self, origin: &RequestOrigin) -> String {
        let back = format!("{}/auth", origin.base());
        format!("{}?redirect={}", self.logout_url, urlencoding::encode(&back))
    }

    /// Resolve claims for an SSO callback.
    ///
    /// IdP failures are soft while a bare `external_id` is available: the
    /// error is logged and minimal claims are synthesized from the id.
    pub async fn complete_callback(
        &self,
        token: Option<&str>,
        external_id: Option<&str>,
    ) -> Result<Claims> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let external_id = external_id.map(str::trim).filter(|id| !id.is_empty());

        if token.is_none() && external_id.is_none() {
            return Err(AppError::NoIdentity);
        }

        let mut idp_error = None;
        if let Some(token) = token {
            match self.fetch_claims(token).await {
                Ok(claims) => return Ok(claims),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not obtain claims from SSO server");
                    idp_error = Some(e);
                }
            }
        }

        match (external_id, idp_error) {
            (Some(id), _) => {
                tracing::info!(external_id = %id, "Using minimal claims from bare user id");
                Claims::from_external_id(id)
            }
            (None, Some(e)) => Err(e),
            (None, None) => Err(AppError::NoIdentity),
        }
    }

    /// Exchange an IdP token for validated claims.
    pub async fn fetch_claims(&self, token: &str) -> Result<Claims> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .query(&[("token", token)])
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::IdpUnavailable(format!("user-info request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::IdpUnavailable(format!(
                "user-info returned status {status}"
            )));
        }

        let body: UserInfoResponse = response
            .json()
            .await
            .map_err(|e| AppError::InvalidIdentity(format!("malformed user-info payload: {e}")))?;

        let profile = body.into_profile().ok_or_else(|| {
            AppError::InvalidIdentity("user-info payload not marked successful".to_string())
        })?;

        Claims::try_from(profile)
    }
}
