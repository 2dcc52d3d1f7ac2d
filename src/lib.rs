// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Portal-Auth: federated session authentication
//!
//! This crate reconciles local password logins, an external SSO server and a
//! seeded demo account into one persisted session and one canonical user
//! record, and exposes role gates for downstream handlers.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::{IdentityStore, SessionStore};
use services::{CredentialVerifier, SessionBinder, SsoClient, UserReconciler};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub identity: Arc<dyn IdentityStore>,
    pub sso: SsoClient,
    pub credentials: CredentialVerifier,
    pub reconciler: UserReconciler,
    pub binder: SessionBinder,
}

impl AppState {
    /// Wire every component to the given stores.
    pub fn new(
        config: Config,
        identity: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        let sso = SsoClient::new(&config)?;
        let binder = SessionBinder::new(
            sessions,
            identity.clone(),
            config.session_secret.clone(),
            config.production,
        );

        Ok(Self {
            credentials: CredentialVerifier::new(identity.clone()),
            reconciler: UserReconciler::new(identity.clone()),
            binder,
            sso,
            identity,
            config,
        })
    }
}
