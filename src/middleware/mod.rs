// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, security, etc.).

pub mod auth;
pub mod security;

pub use auth::{gate, AuthUser, REQUIRE_ADMIN, REQUIRE_ADMIN_OR_MANAGER, REQUIRE_AUTHENTICATED};
