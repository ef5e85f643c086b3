// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! The extractor names the scopes a route accepts:
//!
//! ```rust,ignore
//! async fn get_contacts(auth: Auth, tx: TxHandle) -> Result<Json<Vec<Contact>>, ApiError> {
//!     // auth.identity is the verified caller
//! }
//!
//! async fn schedule(auth: UserOrEnclave, tx: TxHandle) -> ... { }
//!
//! async fn add_wallet(auth: EnclaveOnly, tx: TxHandle) -> ... { }
//! ```
//!
//! Authentication reads from a snapshot and never opens the request's write
//! transaction.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, AuthenticatedUser, Scope};
use crate::state::AppState;

/// Set of session scopes a route accepts.
pub trait ScopePolicy: Send + Sync + 'static {
    const ALLOWED: &'static [Scope];
}

/// Sessions relayed by the user's frontend.
pub struct UserScope;

impl ScopePolicy for UserScope {
    const ALLOWED: &'static [Scope] = &[Scope::User];
}

/// Sessions from the frontend or from the enclave itself.
pub struct UserOrEnclaveScope;

impl ScopePolicy for UserOrEnclaveScope {
    const ALLOWED: &'static [Scope] = &[Scope::User, Scope::Enclave];
}

/// Sessions minted by the enclave for its own calls.
pub struct EnclaveScope;

impl ScopePolicy for EnclaveScope {
    const ALLOWED: &'static [Scope] = &[Scope::Enclave];
}

/// Verified caller, admitted under policy `P`.
pub struct Authenticated<P: ScopePolicy> {
    pub identity: AuthenticatedUser,
    _policy: PhantomData<P>,
}

/// Caller with a `user` session.
pub type Auth = Authenticated<UserScope>;

/// Caller with a `user` or `enclave` session.
pub type UserOrEnclave = Authenticated<UserOrEnclaveScope>;

/// Caller with an `enclave` session.
pub type EnclaveOnly = Authenticated<EnclaveScope>;

impl<P: ScopePolicy> FromRequestParts<AppState> for Authenticated<P> {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?),
            None => None,
        };

        let identity = state
            .auth
            .authenticate(header, &state.transactions, P::ALLOWED)
            .await?;
        Ok(Self {
            identity,
            _policy: PhantomData,
        })
    }
}
