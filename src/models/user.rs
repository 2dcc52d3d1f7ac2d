// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Tenant assigned when the IdP does not name one.
pub const DEFAULT_TENANT_ID: i64 = 1;

/// Access role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Employee => "employee",
        }
    }
}

/// User record stored in the identity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Internal id (also used as document ID)
    pub id: i64,
    /// Unique login name
    pub username: String,
    /// Argon2 PHC string; absent for SSO-only users
    #[serde(default)]
    pub password_hash: Option<String>,
    /// External SSO subject, unique when present
    #[serde(default)]
    pub sso_id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub tenant_id: i64,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Client-safe view of this user (never includes the password hash).
    pub fn safe_projection(&self) -> SafeUser {
        SafeUser {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            role: self.role,
            department: self.department.clone(),
            position: self.position.clone(),
            avatar_url: self.avatar_url.clone(),
            sso_id: self.sso_id.clone(),
        }
    }
}

/// Fields for a user row that does not exist yet; the store assigns the id.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password_hash: Option<String>,
    pub sso_id: Option<String>,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub tenant_id: i64,
    pub last_login: Option<DateTime<Utc>>,
}

impl NewUser {
    pub fn into_user(self, id: i64, created_at: DateTime<Utc>) -> User {
        User {
            id,
            username: self.username,
            password_hash: self.password_hash,
            sso_id: self.sso_id,
            role: self.role,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            department: None,
            position: None,
            avatar_url: self.avatar_url,
            tenant_id: self.tenant_id,
            last_login: self.last_login,
            created_at,
        }
    }
}

/// Profile refresh applied on login. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub last_login: DateTime<Utc>,
}

impl ProfileUpdate {
    pub fn apply(&self, user: &mut User) {
        if let Some(v) = &self.first_name {
            user.first_name = Some(v.clone());
        }
        if let Some(v) = &self.last_name {
            user.last_name = Some(v.clone());
        }
        if let Some(v) = &self.email {
            user.email = Some(v.clone());
        }
        if let Some(v) = &self.avatar_url {
            user.avatar_url = Some(v.clone());
        }
        user.last_login = Some(self.last_login);
    }
}

/// Safe user projection returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SafeUser {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub department: Option<String>,
    pub position: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_id: Option<String>,
}
