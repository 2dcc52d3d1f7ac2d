// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity claims asserted by the SSO server.

use crate::error::AppError;
use serde::Deserialize;

/// Envelope returned by the IdP user-info endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<IdpProfile>,
}

impl UserInfoResponse {
    /// The payload counts as successful when either `code == 200` or
    /// `status == "success"`, and it carries a profile.
    pub fn into_profile(self) -> Option<IdpProfile> {
        let ok = self.code == Some(200) || self.status.as_deref() == Some("success");
        if ok {
            self.data
        } else {
            None
        }
    }
}

/// Raw profile as sent by the IdP. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdpProfile {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default, rename = "tenantId")]
    pub tenant_id: Option<i64>,
}

/// Validated claims handed to reconciliation.
///
/// `subject` and `username` are both non-empty and trimmed; each falls back
/// to the other when the IdP sent only one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub tenant_id: Option<i64>,
}

impl Claims {
    /// Minimal claims for an IdP redirect that carried only a bare user id.
    pub fn from_external_id(external_id: &str) -> Result<Self, AppError> {
        let id = external_id.trim();
        if id.is_empty() {
            return Err(AppError::InvalidIdentity("empty external user id".to_string()));
        }

        let display_name = if id == "admin" {
            "System Administrator".to_string()
        } else {
            format!("User {id}")
        };

        Ok(Self {
            subject: id.to_string(),
            username: id.to_string(),
            first_name: None,
            last_name: None,
            full_name: Some(display_name),
            email: Some(format!("{id}@example.com")),
            avatar_url: None,
            tenant_id: Some(crate::models::user::DEFAULT_TENANT_ID),
        })
    }

    /// First and last name: explicit claims win, otherwise the full name is
    /// split at its first whitespace boundary. Empty values count as absent.
    pub fn derived_names(&self) -> (Option<String>, Option<String>) {
        let (split_first, split_last) = match self.full_name.as_deref().map(str::trim) {
            Some(full) => match full.split_once(char::is_whitespace) {
                Some((first, rest)) => (non_empty(Some(first)), non_empty(Some(rest.trim()))),
                None => (non_empty(Some(full)), None),
            },
            None => (None, None),
        };

        (
            non_empty(self.first_name.as_deref()).or(split_first),
            non_empty(self.last_name.as_deref()).or(split_last),
        )
    }
}

impl TryFrom<IdpProfile> for Claims {
    type Error = AppError;

    fn try_from(profile: IdpProfile) -> Result<Self, Self::Error> {
        let sub = non_empty(profile.sub.as_deref());
        let username = non_empty(profile.username.as_deref());

        let (subject, username) = match (sub, username) {
            (Some(s), Some(u)) => (s, u),
            (Some(s), None) => (s.clone(), s),
            (None, Some(u)) => (u.clone(), u),
            (None, None) => {
                return Err(AppError::InvalidIdentity(
                    "profile has neither sub nor username".to_string(),
                ))
            }
        };

        Ok(Self {
            subject,
            username,
            first_name: non_empty(profile.first_name.as_deref()),
            last_name: non_empty(profile.last_name.as_deref()),
            full_name: non_empty(profile.name.as_deref()),
            email: non_empty(profile.email.as_deref()),
            avatar_url: non_empty(profile.profile_image_url.as_deref()),
            tenant_id: profile.tenant_id,
        })
    }
}

/// Trim and drop empty strings.
pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
