// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token verification.
//!
//! Tokens are EdDSA (Ed25519) JWTs minted by the user's enclave. A token is
//! accepted only if:
//!
//! - the algorithm is EdDSA (anything else, including `none`, is rejected)
//! - the signature verifies under the subject's verification key
//! - `iss` is the enclave and `aud` is this backend
//! - `iat` is present and not in the future beyond the clock skew
//! - `exp`, when present, has not passed
//! - the `scope` claim is in the route's allow-list, when the route has one

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::claims::{BackendClaims, Scope, BACKEND_AUDIENCE, ENCLAVE_ISSUER};
use super::error::AuthError;

/// Clock skew tolerance (60 seconds).
pub const CLOCK_SKEW_LEEWAY: u64 = 60;

// =============================================================================
// Verification Key
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum KeyFormatError {
    #[error("verification key is not valid hex: {0}")]
    Hex(String),

    #[error("verification key must be 32 bytes, got {0}")]
    Length(usize),
}

/// Raw Ed25519 public key of an enclave.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VerificationKey([u8; 32]);

impl VerificationKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyFormatError> {
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyFormatError::Length(bytes.len()))?;
        Ok(Self(raw))
    }

    /// Parse the hex form stored on the user record.
    pub fn from_hex(hex: &str) -> Result<Self, KeyFormatError> {
        let bytes = alloy::hex::decode(hex.trim()).map_err(|e| KeyFormatError::Hex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        alloy::hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_ed_der(&self.0)
    }
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerificationKey({})", self.to_hex())
    }
}

// =============================================================================
// Verifier
// =============================================================================

#[derive(Deserialize)]
struct SubjectOnly {
    #[serde(default)]
    sub: Option<String>,
}

/// Read the subject of a token without checking its signature.
///
/// Only used to pick the key; the full token, subject included, is verified
/// afterwards.
pub fn unverified_subject(token: &str) -> Result<String, AuthError> {
    let data = jsonwebtoken::dangerous::insecure_decode::<SubjectOnly>(token)
        .map_err(|_| AuthError::MalformedToken)?;
    match data.claims.sub {
        Some(sub) if !sub.is_empty() => Ok(sub),
        _ => Err(AuthError::MalformedToken),
    }
}

/// Verified claims plus the scope they were accepted under.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub claims: BackendClaims,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone)]
pub struct ClaimsVerifier {
    leeway: u64,
}

impl Default for ClaimsVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimsVerifier {
    pub fn new() -> Self {
        Self {
            leeway: CLOCK_SKEW_LEEWAY,
        }
    }

    /// Verify `token` against `key` at the current time.
    pub fn verify(
        &self,
        token: &str,
        key: &VerificationKey,
        allowed: &[Scope],
    ) -> Result<VerifiedClaims, AuthError> {
        self.verify_at(token, key, allowed, chrono::Utc::now().timestamp())
    }

    /// Verify `token` as of `now` (Unix seconds) for the `iat` check.
    pub fn verify_at(
        &self,
        token: &str,
        key: &VerificationKey,
        allowed: &[Scope],
        now: i64,
    ) -> Result<VerifiedClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.leeway = self.leeway;
        validation.set_issuer(&[ENCLAVE_ISSUER]);
        validation.set_audience(&[BACKEND_AUDIENCE]);
        validation.set_required_spec_claims(&["iss", "aud", "sub"]);

        let claims = decode::<BackendClaims>(token, &key.decoding_key(), &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;

        match claims.iat {
            Some(iat) if iat <= now + self.leeway as i64 => {}
            _ => return Err(AuthError::InvalidIssuedAt),
        }

        let scope = claims.scope.as_deref().and_then(Scope::parse);
        if !allowed.is_empty() && !scope.is_some_and(|s| allowed.contains(&s)) {
            return Err(AuthError::ScopeNotAllowed);
        }

        Ok(VerifiedClaims { claims, scope })
    }
}
