// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User reconciliation: map inbound claims onto exactly one identity row.
//!
//! Lookup order is SSO subject first, then username. A row found by either
//! key is linked to the subject (its own write) before the profile refresh,
//! so an interrupted reconciliation still leaves a row the next login finds
//! by subject. Unknown identities get a fresh `employee` row.
//!
//! Two first logins of the same subject can race to create the row. The
//! loser sees a unique-constraint conflict and repeats lookup-then-create
//! once; a second conflict is reported as `ReconciliationConflict`.

use crate::db::IdentityStore;
use crate::error::{AppError, Result};
use crate::models::claims::non_empty;
use crate::models::user::DEFAULT_TENANT_ID;
use crate::models::{Claims, NewUser, ProfileUpdate, Role, User};
use chrono::Utc;
use std::sync::Arc;

/// Create-or-update of identity rows from SSO claims.
#[derive(Clone)]
pub struct UserReconciler {
    identity: Arc<dyn IdentityStore>,
}

impl UserReconciler {
    pub fn new(identity: Arc<dyn IdentityStore>) -> Self {
        Self { identity }
    }

    /// Reconcile `claims` and return the resulting row.
    pub async fn reconcile(&self, claims: &Claims) -> Result<User> {
        let subject = non_empty(Some(claims.subject.as_str()));
        let username = non_empty(Some(claims.username.as_str()));

        let (subject, username) = match (subject, username) {
            (Some(s), Some(u)) => (s, u),
            (Some(s), None) => (s.clone(), s),
            (None, Some(u)) => (u.clone(), u),
            (None, None) => {
                return Err(AppError::InvalidIdentity(
                    "claims carry neither subject nor username".to_string(),
                ))
            }
        };

        match self.attempt(&subject, &username, claims).await {
            Err(AppError::Conflict(reason)) => {
                tracing::warn!(
                    subject = %subject,
                    reason = %reason,
                    "Reconciliation hit a constraint conflict, retrying once"
                );
                match self.attempt(&subject, &username, claims).await {
                    Err(AppError::Conflict(reason)) => Err(AppError::ReconciliationConflict(reason)),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn attempt(&self, subject: &str, username: &str, claims: &Claims) -> Result<User> {
        let existing = match self.identity.find_by_sso_id(subject).await? {
            Some(user) => Some(user),
            None => self.identity.find_by_username(username).await?,
        };

        let now = Utc::now();
        let (first_name, last_name) = claims.derived_names();

        match existing {
            Some(user) => {
                if user.sso_id.as_deref() != Some(subject) {
                    tracing::info!(
                        user_id = user.id,
                        previous = ?user.sso_id,
                        subject = %subject,
                        "Linking SSO subject to existing user"
                    );
                    self.identity.link_sso_id(user.id, subject).await?;
                }

                let update = ProfileUpdate {
                    first_name,
                    last_name,
                    email: claims.email.clone(),
                    avatar_url: claims.avatar_url.clone(),
                    last_login: now,
                };
                let user = self.identity.update_profile(user.id, &update).await?;

                tracing::info!(user_id = user.id, "User profile refreshed from SSO");
                Ok(user)
            }
            None => {
                let new_user = NewUser {
                    username: username.to_string(),
                    password_hash: None,
                    sso_id: Some(subject.to_string()),
                    role: Role::Employee,
                    first_name: first_name.or_else(|| Some(username.to_string())),
                    last_name,
                    email: claims
                        .email
                        .clone()
                        .or_else(|| Some(format!("{username}@example.com"))),
                    avatar_url: claims.avatar_url.clone(),
                    tenant_id: claims.tenant_id.unwrap_or(DEFAULT_TENANT_ID),
                    last_login: Some(now),
                };
                let user = self.identity.create_user(new_user).await?;

                tracing::info!(user_id = user.id, subject = %subject, "User created from SSO");
                Ok(user)
            }
        }
    }
}
