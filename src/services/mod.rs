// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod credentials;
pub mod reconcile;
pub mod session;
pub mod sso;

pub use credentials::{demo_login, seed_demo_account, CredentialVerifier};
pub use reconcile::UserReconciler;
pub use session::{BoundSession, SessionBinder};
pub use sso::{RequestOrigin, SsoClient};
