// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod claims;
pub mod session;
pub mod user;

pub use claims::{Claims, IdpProfile, UserInfoResponse};
pub use session::SessionRecord;
pub use user::{NewUser, ProfileUpdate, Role, SafeUser, User};
