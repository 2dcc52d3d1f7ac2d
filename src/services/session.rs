// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session binding: persist a session for a verified user and resolve the
//! session cookie back to a user on later requests.
//!
//! The cookie carries `<session-id>.<hex hmac>`; the session record holds only
//! the user id, so every resolve re-reads the user from the identity store.

use crate::config::{SESSION_COOKIE, SESSION_TTL_SECS};
use crate::db::{IdentityStore, SessionStore};
use crate::error::{AppError, Result};
use crate::models::{SessionRecord, User};
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const SESSION_ID_BYTES: usize = 32;

/// A freshly persisted session and the cookie value that refers to it.
#[derive(Debug, Clone)]
pub struct BoundSession {
    pub record: SessionRecord,
    pub cookie_value: String,
}

/// Creates, resolves and destroys sessions.
#[derive(Clone)]
pub struct SessionBinder {
    sessions: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityStore>,
    secret: Vec<u8>,
    secure_cookies: bool,
    rng: SystemRandom,
}

impl SessionBinder {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityStore>,
        secret: Vec<u8>,
        secure_cookies: bool,
    ) -> Self {
        Self {
            sessions,
            identity,
            secret,
            secure_cookies,
            rng: SystemRandom::new(),
        }
    }

    fn new_session_id(&self) -> Result<String> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("session id generation failed")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))
    }

    /// Cookie value for a session id.
    pub fn sign(&self, session_id: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(session_id.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{session_id}.{signature}"))
    }

    /// Session id from a cookie value, or `None` if the signature does not match.
    pub fn verify_cookie(&self, value: &str) -> Option<String> {
        let (session_id, signature_hex) = value.rsplit_once('.')?;
        let signature = hex::decode(signature_hex).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(session_id.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::warn!("Session cookie signature mismatch");
            return None;
        }

        Some(session_id.to_string())
    }

    /// Persist a new session for `user`.
    ///
    /// Returns only after the store acknowledged the write; any store failure
    /// becomes `SessionPersist` and no cookie is issued.
    pub async fn bind(&self, user: &User) -> Result<BoundSession> {
        let session_id = self.new_session_id()?;
        let record = SessionRecord::new(
            session_id,
            user.id,
            Utc::now(),
            Duration::seconds(SESSION_TTL_SECS),
        );

        self.sessions.save(&record).await.map_err(|e| match e {
            AppError::SessionPersist(msg) => AppError::SessionPersist(msg),
            other => AppError::SessionPersist(other.to_string()),
        })?;

        let cookie_value = self.sign(&record.id)?;
        tracing::info!(user_id = user.id, "Session established");

        Ok(BoundSession {
            record,
            cookie_value,
        })
    }

    /// Destroy the session `previous` refers to, then bind a fresh one.
    ///
    /// A login never leaves the caller's earlier session usable.
    pub async fn replace(&self, previous: Option<&str>, user: &User) -> Result<BoundSession> {
        if let Some(previous) = previous {
            self.destroy(previous).await?;
        }
        self.bind(user).await
    }

    /// Resolve a cookie value to the current user row.
    ///
    /// Unsigned, unknown and expired sessions resolve to `None`; expired
    /// sessions and sessions whose user vanished are destroyed on the way.
    pub async fn resolve(&self, cookie_value: &str) -> Result<Option<User>> {
        let Some(session_id) = self.verify_cookie(cookie_value) else {
            return Ok(None);
        };

        let Some(record) = self.sessions.load(&session_id).await? else {
            return Ok(None);
        };

        if record.is_expired(Utc::now()) {
            tracing::debug!(user_id = record.user_id, "Session expired");
            self.sessions.destroy(&session_id).await?;
            return Ok(None);
        }

        match self.identity.find_by_id(record.user_id).await? {
            Some(user) => Ok(Some(user)),
            None => {
                tracing::warn!(user_id = record.user_id, "Session bound to missing user");
                self.sessions.destroy(&session_id).await?;
                Ok(None)
            }
        }
    }

    /// Destroy the session a cookie refers to. Unsigned cookies are ignored.
    pub async fn destroy(&self, cookie_value: &str) -> Result<()> {
        if let Some(session_id) = self.verify_cookie(cookie_value) {
            self.sessions.destroy(&session_id).await?;
            tracing::info!("Session destroyed");
        }
        Ok(())
    }

    /// Session cookie for a bound session.
    pub fn cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(SESSION_TTL_SECS))
            .build()
    }

    /// Expired session cookie with the same attributes as [`Self::cookie`].
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.cookie(String::new());
        cookie.make_removal();
        cookie
    }
}
