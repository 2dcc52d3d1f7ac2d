// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence layer: identity store and session store.
//!
//! Both stores are traits so handlers only ever see `Arc<dyn ...>`; the
//! Firestore backend is used in deployment and the in-memory backend for
//! local development and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::Result;
use crate::models::{NewUser, ProfileUpdate, SessionRecord, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Claim documents enforcing unique usernames (keyed by encoded username)
    pub const USER_USERNAMES: &str = "user_usernames";
    /// Claim documents enforcing unique SSO subjects (keyed by encoded subject)
    pub const USER_SSO_IDS: &str = "user_sso_ids";
    pub const SESSIONS: &str = "sessions";
}

/// Persisted users, unique on `username` and on non-null `sso_id`.
///
/// Unavailability is reported as `AppError::StoreUnavailable`; unique
/// constraint violations as `AppError::Conflict`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_by_sso_id(&self, sso_id: &str) -> Result<Option<User>>;

    /// Insert a new row and assign its id.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Set `sso_id` on an existing row, releasing any subject it held before.
    async fn link_sso_id(&self, id: i64, sso_id: &str) -> Result<()>;

    async fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<User>;

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// Durable server-side sessions keyed by opaque id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &SessionRecord) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>>;

    /// Remove a session. Removing an unknown id is not an error.
    async fn destroy(&self, id: &str) -> Result<()>;

    /// Remove all sessions expired at `now`; returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
