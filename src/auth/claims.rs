// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session claims and the authenticated identity.

use serde::Deserialize;

use crate::models::User;

/// Issuer every accepted session token must carry.
pub const ENCLAVE_ISSUER: &str = "elonwallet-enclave";

/// Audience every accepted session token must carry.
pub const BACKEND_AUDIENCE: &str = "elonwallet-backend";

/// Who a session token was minted for.
///
/// `User` tokens are relayed by the frontend; `Enclave` tokens are sent by
/// the enclave itself (for example when it schedules notifications).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Enclave,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Enclave => "enclave",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Scope::User),
            "enclave" => Some(Scope::Enclave),
            _ => None,
        }
    }
}

/// Claims carried by an enclave-signed session token.
///
/// `aud` is checked by the decoder and not read afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendClaims {
    pub iss: String,
    /// Email of the account the token speaks for
    pub sub: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Identity established by a verified session token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub scope: Option<Scope>,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn email(&self) -> &str {
        &self.user.email
    }
}
