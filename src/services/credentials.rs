// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local username/password verification and demo account seeding.

use crate::db::IdentityStore;
use crate::error::{AppError, Result};
use crate::models::{NewUser, Role, User};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use std::sync::{Arc, LazyLock};

/// Hash a plain password with argon2id into a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

/// Verify a password against a stored PHC string. Unparseable hashes never match.
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Validates local credentials against the identity store.
#[derive(Clone)]
pub struct CredentialVerifier {
    identity: Arc<dyn IdentityStore>,
}

impl CredentialVerifier {
    pub fn new(identity: Arc<dyn IdentityStore>) -> Self {
        Self { identity }
    }

    /// Check `username`/`password`; on success record the login time.
    ///
    /// Fails with `NotFound` for an unknown username and `BadCredential` for a
    /// wrong password (or an SSO-only account without a password). Every
    /// path runs one Argon2 verification so timing does not reveal which
    /// usernames exist.
    pub async fn verify(&self, username: &str, password: &str) -> Result<User> {
        let user = self.identity.find_by_username(username).await?;

        // Argon2 verification blocks for tens of milliseconds.
        let phc = phc_for(user.as_ref());
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &phc))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("password check aborted: {e}")))?;

        let user = user.ok_or_else(|| AppError::NotFound(format!("User {username}")))?;

        if user.password_hash.is_none() {
            tracing::info!(user_id = user.id, "Password login attempted for SSO-only user");
            return Err(AppError::BadCredential);
        }

        if !matches {
            tracing::info!(user_id = user.id, "Password mismatch");
            return Err(AppError::BadCredential);
        }

        let now = Utc::now();
        self.identity.touch_last_login(user.id, now).await?;

        Ok(User {
            last_login: Some(now),
            ..user
        })
    }
}

/// Hash checked for logins without a stored password. Never matches.
static DUMMY_PHC: LazyLock<String> = LazyLock::new(|| {
    hash_password("portal-auth dummy credential").unwrap_or_else(|e| {
        tracing::error!(error = %e, "Could not prepare dummy password hash");
        String::new()
    })
});

/// Stored hash to verify against, or the dummy hash when there is none.
fn phc_for(user: Option<&User>) -> String {
    user.and_then(|u| u.password_hash.clone())
        .unwrap_or_else(|| DUMMY_PHC.clone())
}

/// Look up the demo account and record the login. `NotFound` if it was never seeded.
pub async fn demo_login(identity: &dyn IdentityStore, username: &str) -> Result<User> {
    let user = identity
        .find_by_username(username)
        .await?
        .ok_or_else(|| AppError::NotFound("Demo account does not exist".to_string()))?;

    let now = Utc::now();
    identity.touch_last_login(user.id, now).await?;

    Ok(User {
        last_login: Some(now),
        ..user
    })
}

/// Create the demo admin account if it does not exist yet.
///
/// Returns `true` when a row was created.
pub async fn seed_demo_account(
    identity: &dyn IdentityStore,
    username: &str,
    password: &str,
) -> Result<bool> {
    if identity.find_by_username(username).await?.is_some() {
        return Ok(false);
    }

    let password = password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing aborted: {e}")))??;

    let result = identity
        .create_user(NewUser {
            username: username.to_string(),
            password_hash: Some(password_hash),
            role: Role::Admin,
            first_name: Some("Demo".to_string()),
            last_name: Some("Admin".to_string()),
            email: Some(format!("{username}@example.com")),
            tenant_id: crate::models::user::DEFAULT_TENANT_ID,
            ..Default::default()
        })
        .await;

    match result {
        Ok(user) => {
            tracing::info!(user_id = user.id, username, "Demo account seeded");
            Ok(true)
        }
        // Another instance seeded it first.
        Err(AppError::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
