// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Sessions are JWTs signed by the user's enclave, never by this service.
//!
//! ## Auth Flow
//!
//! 1. The enclave signs a token (`iss` = enclave, `aud` = backend,
//!    `sub` = account email, `scope` = `user` or `enclave`)
//! 2. The caller sends `Authorization: Bearer <token>`
//! 3. This service:
//!    - reads `sub` and loads the account from a read snapshot
//!    - resolves the account's Ed25519 verification key
//!    - verifies signature, issuer, audience, `iat` and scope
//!
//! ## Security
//!
//! - Only EdDSA is accepted
//! - Every rejection returns the same generic 401 body
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod resolver;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_keys;

pub use claims::{AuthenticatedUser, BackendClaims, Scope, BACKEND_AUDIENCE, ENCLAVE_ISSUER};
pub use error::AuthError;
pub use extractor::{Auth, Authenticated, EnclaveOnly, UserOrEnclave};
pub use guard::AuthenticationGuard;
pub use resolver::{KeyResolveError, KeyResolver, LiveKeyResolver, PersistedKeyResolver};
pub use verifier::{ClaimsVerifier, VerificationKey};
