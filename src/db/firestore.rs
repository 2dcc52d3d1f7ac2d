// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (`users/{id}`)
//! - Uniqueness claims (`user_usernames/{key}`, `user_sso_ids/{key}`)
//! - Sessions (`sessions/{id}`)
//!
//! Firestore has no secondary unique indexes, so every username and SSO
//! subject owns a claim document. Claims are written in the same transaction
//! as the user document with an exists=false precondition; a second writer
//! fails the commit instead of creating a duplicate row.

use crate::db::{collections, IdentityStore, SessionStore};
use crate::error::{AppError, Result};
use crate::models::{NewUser, ProfileUpdate, SessionRecord, User};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use firestore::errors::FirestoreError;
use firestore::FirestoreWritePrecondition;
use serde::{Deserialize, Serialize};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Attempts at claiming a fresh user id before giving up.
const MAX_ID_ATTEMPTS: usize = 5;

/// Points a unique key at the user that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityClaim {
    user_id: i64,
}

/// Stored form of a session; expiry kept as unix seconds for range queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionDoc {
    id: String,
    user_id: i64,
    created_at_secs: i64,
    expires_at_secs: i64,
}

impl From<&SessionRecord> for SessionDoc {
    fn from(s: &SessionRecord) -> Self {
        Self {
            id: s.id.clone(),
            user_id: s.user_id,
            created_at_secs: s.created_at.timestamp(),
            expires_at_secs: s.expires_at.timestamp(),
        }
    }
}

impl SessionDoc {
    fn into_record(self) -> Option<SessionRecord> {
        Some(SessionRecord {
            id: self.id,
            user_id: self.user_id,
            created_at: Utc.timestamp_opt(self.created_at_secs, 0).single()?,
            expires_at: Utc.timestamp_opt(self.expires_at_secs, 0).single()?,
        })
    }
}

/// Document id for a unique key. Keys are percent-encoded and prefixed so
/// that `.`/`..` and slashes never reach Firestore as path segments.
fn claim_key(value: &str) -> String {
    format!("k_{}", urlencoding::encode(value))
}

fn store_error(e: FirestoreError) -> AppError {
    match e {
        FirestoreError::DataConflictError(err) => AppError::Conflict(err.to_string()),
        other => AppError::StoreUnavailable(other.to_string()),
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return `StoreUnavailable` if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client.as_ref().ok_or_else(|| {
            AppError::StoreUnavailable("Database not connected (offline mode)".to_string())
        })
    }

    async fn get_claim(&self, collection: &str, value: &str) -> Result<Option<IdentityClaim>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(&claim_key(value))
            .await
            .map_err(store_error)
    }

    async fn put_user(&self, user: &User) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user.id.to_string())
            .object(user)
            .execute()
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn require_user(&self, id: i64) -> Result<User> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {id}")))
    }

    /// Highest assigned id plus one.
    async fn next_user_id(&self) -> Result<i64> {
        let newest: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .order_by([("id", firestore::FirestoreQueryDirection::Descending)])
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(store_error)?;

        Ok(newest.first().map(|u| u.id + 1).unwrap_or(1))
    }

    /// One transactional attempt at writing a user with its claim documents.
    async fn try_create(&self, user: &User) -> Result<()> {
        let client = self.get_client()?;
        let mut transaction = client.begin_transaction().await.map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to begin transaction: {}", e))
        })?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(user.id.to_string())
            .object(user)
            .add_to_transaction(&mut transaction)
            .map_err(store_error)?;

        client
            .fluent()
            .update()
            .in_col(collections::USER_USERNAMES)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(claim_key(&user.username))
            .object(&IdentityClaim { user_id: user.id })
            .add_to_transaction(&mut transaction)
            .map_err(store_error)?;

        if let Some(sso_id) = &user.sso_id {
            client
                .fluent()
                .update()
                .in_col(collections::USER_SSO_IDS)
                .precondition(FirestoreWritePrecondition::Exists(false))
                .document_id(claim_key(sso_id))
                .object(&IdentityClaim { user_id: user.id })
                .add_to_transaction(&mut transaction)
                .map_err(store_error)?;
        }

        transaction.commit().await.map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for FirestoreDb {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(store_error)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.get_claim(collections::USER_USERNAMES, username).await? {
            Some(claim) => self.find_by_id(claim.user_id).await,
            None => Ok(None),
        }
    }

    async fn find_by_sso_id(&self, sso_id: &str) -> Result<Option<User>> {
        match self.get_claim(collections::USER_SSO_IDS, sso_id).await? {
            Some(claim) => self.find_by_id(claim.user_id).await,
            None => Ok(None),
        }
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let created_at = Utc::now();

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.next_user_id().await?;
            let user = new_user.clone().into_user(id, created_at);

            match self.try_create(&user).await {
                Ok(()) => {
                    tracing::info!(user_id = id, username = %user.username, "User created");
                    return Ok(user);
                }
                Err(AppError::Conflict(reason)) => {
                    // Either a unique key is taken or another writer got this id.
                    let username_taken = self
                        .get_claim(collections::USER_USERNAMES, &user.username)
                        .await?
                        .is_some();
                    let subject_taken = match &user.sso_id {
                        Some(sso_id) => self
                            .get_claim(collections::USER_SSO_IDS, sso_id)
                            .await?
                            .is_some(),
                        None => false,
                    };

                    if username_taken || subject_taken {
                        return Err(AppError::Conflict(reason));
                    }

                    tracing::debug!(user_id = id, "User id already claimed, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::StoreUnavailable(
            "could not allocate a user id".to_string(),
        ))
    }

    async fn link_sso_id(&self, id: i64, sso_id: &str) -> Result<()> {
        let mut user = self.require_user(id).await?;

        let existing = self.get_claim(collections::USER_SSO_IDS, sso_id).await?;
        match existing {
            Some(claim) if claim.user_id != id => {
                return Err(AppError::Conflict(format!(
                    "sso_id {sso_id} already linked to user {}",
                    claim.user_id
                )));
            }
            _ => {}
        }

        let client = self.get_client()?;
        let mut transaction = client.begin_transaction().await.map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to begin transaction: {}", e))
        })?;

        if existing.is_none() {
            client
                .fluent()
                .update()
                .in_col(collections::USER_SSO_IDS)
                .precondition(FirestoreWritePrecondition::Exists(false))
                .document_id(claim_key(sso_id))
                .object(&IdentityClaim { user_id: id })
                .add_to_transaction(&mut transaction)
                .map_err(store_error)?;
        }

        if let Some(previous) = user.sso_id.as_deref().filter(|p| *p != sso_id) {
            client
                .fluent()
                .delete()
                .from(collections::USER_SSO_IDS)
                .document_id(claim_key(previous))
                .add_to_transaction(&mut transaction)
                .map_err(store_error)?;
        }

        user.sso_id = Some(sso_id.to_string());
        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(id.to_string())
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(store_error)?;

        transaction.commit().await.map_err(store_error)?;

        tracing::info!(user_id = id, "SSO subject linked");
        Ok(())
    }

    async fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<User> {
        let mut user = self.require_user(id).await?;
        update.apply(&mut user);
        self.put_user(&user).await?;
        Ok(user)
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut user = self.require_user(id).await?;
        user.last_login = Some(at);
        self.put_user(&user).await
    }
}

#[async_trait]
impl SessionStore for FirestoreDb {
    async fn save(&self, session: &SessionRecord) -> Result<()> {
        let doc = SessionDoc::from(session);
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SESSIONS)
            .document_id(&session.id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::SessionPersist(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        let doc: Option<SessionDoc> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SESSIONS)
            .obj()
            .one(id)
            .await
            .map_err(store_error)?;

        Ok(doc.and_then(SessionDoc::into_record))
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::SESSIONS)
            .document_id(id)
            .execute()
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let client = self.get_client()?;
        let cutoff = now.timestamp();
        let mut purged = 0;

        loop {
            let expired: Vec<SessionDoc> = client
                .fluent()
                .select()
                .from(collections::SESSIONS)
                .filter(|q| q.for_all([q.field("expires_at_secs").less_than_or_equal(cutoff)]))
                .limit(BATCH_SIZE as u32)
                .obj()
                .query()
                .await
                .map_err(store_error)?;

            if expired.is_empty() {
                break;
            }

            let mut transaction = client.begin_transaction().await.map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to begin transaction: {}", e))
            })?;

            for doc in &expired {
                client
                    .fluent()
                    .delete()
                    .from(collections::SESSIONS)
                    .document_id(&doc.id)
                    .add_to_transaction(&mut transaction)
                    .map_err(store_error)?;
            }

            transaction.commit().await.map_err(store_error)?;
            purged += expired.len();

            if expired.len() < BATCH_SIZE {
                break;
            }
        }

        Ok(purged)
    }
}
