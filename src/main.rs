// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Portal-Auth API Server
//!
//! Serves local, demo and SSO logins backed by Firestore, or by an in-memory
//! store when no GCP project is configured.

use portal_auth::{
    config::Config,
    db::{FirestoreDb, IdentityStore, MemoryDb, SessionStore},
    services::seed_demo_account,
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Portal-Auth API");

    let (identity, sessions): (Arc<dyn IdentityStore>, Arc<dyn SessionStore>) =
        match &config.gcp_project_id {
            Some(project_id) => {
                let db = Arc::new(
                    FirestoreDb::new(project_id)
                        .await
                        .expect("Failed to connect to Firestore"),
                );
                (db.clone(), db)
            }
            None => {
                tracing::warn!("GCP_PROJECT_ID not set, using in-memory store");
                let db = Arc::new(MemoryDb::new());
                (db.clone(), db)
            }
        };

    if let Some(password) = &config.demo_password {
        let created = seed_demo_account(identity.as_ref(), &config.demo_username, password)
            .await
            .expect("Failed to seed demo account");
        tracing::info!(
            username = %config.demo_username,
            created,
            "Demo account ready"
        );
    }

    spawn_session_purge(sessions.clone());

    let state = Arc::new(AppState::new(config.clone(), identity, sessions)?);

    // Build router
    let app = portal_auth::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically delete expired session records.
fn spawn_session_purge(sessions: Arc<dyn SessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match sessions.purge_expired(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    });
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("portal_auth=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
