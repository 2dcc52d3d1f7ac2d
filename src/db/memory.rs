// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory identity and session store.
//!
//! Used for local development (no `GCP_PROJECT_ID`) and tests. Writes that
//! touch the unique indexes are serialized by a single async mutex, so the
//! username and SSO subject constraints hold under concurrent requests.

use crate::db::{IdentityStore, SessionStore};
use crate::error::{AppError, Result};
use crate::models::{NewUser, ProfileUpdate, SessionRecord, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    users: DashMap<i64, User>,
    usernames: DashMap<String, i64>,
    sso_ids: DashMap<String, i64>,
    sessions: DashMap<String, SessionRecord>,
    next_id: AtomicI64,
    write_lock: Mutex<()>,
}

/// In-memory database. Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Inner>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub fn user_count(&self) -> usize {
        self.inner.users.len()
    }

    /// Number of stored sessions (expired ones included).
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    fn get(&self, id: i64) -> Option<User> {
        self.inner.users.get(&id).map(|u| u.value().clone())
    }
}

#[async_trait]
impl IdentityStore for MemoryDb {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.get(id))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let id = self.inner.usernames.get(username).map(|e| *e.value());
        Ok(id.and_then(|id| self.get(id)))
    }

    async fn find_by_sso_id(&self, sso_id: &str) -> Result<Option<User>> {
        let id = self.inner.sso_ids.get(sso_id).map(|e| *e.value());
        Ok(id.and_then(|id| self.get(id)))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let _guard = self.inner.write_lock.lock().await;

        if self.inner.usernames.contains_key(&new_user.username) {
            return Err(AppError::Conflict(format!(
                "username already exists: {}",
                new_user.username
            )));
        }
        if let Some(sso_id) = &new_user.sso_id {
            if self.inner.sso_ids.contains_key(sso_id) {
                return Err(AppError::Conflict(format!("sso_id already linked: {sso_id}")));
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let user = new_user.into_user(id, Utc::now());

        self.inner.usernames.insert(user.username.clone(), id);
        if let Some(sso_id) = &user.sso_id {
            self.inner.sso_ids.insert(sso_id.clone(), id);
        }
        self.inner.users.insert(id, user.clone());

        Ok(user)
    }

    async fn link_sso_id(&self, id: i64, sso_id: &str) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;

        if let Some(owner) = self.inner.sso_ids.get(sso_id).map(|e| *e.value()) {
            if owner != id {
                return Err(AppError::Conflict(format!(
                    "sso_id {sso_id} already linked to user {owner}"
                )));
            }
        }

        let mut user = self
            .inner
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {id}")))?;

        if let Some(previous) = user.sso_id.replace(sso_id.to_string()) {
            if previous != sso_id {
                self.inner.sso_ids.remove(&previous);
            }
        }
        self.inner.sso_ids.insert(sso_id.to_string(), id);

        Ok(())
    }

    async fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<User> {
        let mut user = self
            .inner
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {id}")))?;
        update.apply(&mut user);
        Ok(user.clone())
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut user = self
            .inner
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {id}")))?;
        user.last_login = Some(at);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryDb {
    async fn save(&self, session: &SessionRecord) -> Result<()> {
        self.inner
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.inner.sessions.get(id).map(|s| s.value().clone()))
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.inner.sessions.remove(id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.inner.sessions.len();
        self.inner.sessions.retain(|_, s| !s.is_expired(now));
        Ok(before.saturating_sub(self.inner.sessions.len()))
    }
}
