// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification key resolution.
//!
//! Two strategies, chosen per deployment with `KEY_RESOLUTION`:
//!
//! - [`PersistedKeyResolver`]: the key captured at activation, read from the
//!   user record. No network access; stale if the enclave rotates its key.
//! - [`LiveKeyResolver`]: asks the user's enclave on every authentication,
//!   bounded by a timeout.

use async_trait::async_trait;

use super::verifier::VerificationKey;
use crate::enclave::EnclaveClient;
use crate::models::User;

#[derive(Debug, thiserror::Error)]
pub enum KeyResolveError {
    /// The identity has no usable key (not activated, or a corrupt stored key)
    #[error("no verification key: {0}")]
    NotFound(String),

    /// The enclave could not be reached or answered badly
    #[error("verification key fetch failed: {0}")]
    Transport(String),
}

/// Produces the key session tokens for an identity must be signed with.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, identity: &User) -> Result<VerificationKey, KeyResolveError>;
}

/// Uses the hex key stored on the user at activation time.
#[derive(Debug, Clone, Default)]
pub struct PersistedKeyResolver;

#[async_trait]
impl KeyResolver for PersistedKeyResolver {
    async fn resolve(&self, identity: &User) -> Result<VerificationKey, KeyResolveError> {
        if identity.verification_key.is_empty() {
            return Err(KeyResolveError::NotFound(format!(
                "user {} is not activated",
                identity.id
            )));
        }
        VerificationKey::from_hex(&identity.verification_key)
            .map_err(|e| KeyResolveError::NotFound(e.to_string()))
    }
}

/// Fetches the key from the user's enclave on every call.
#[derive(Debug, Clone)]
pub struct LiveKeyResolver {
    client: EnclaveClient,
}

impl LiveKeyResolver {
    /// `client` should carry a short timeout; it sits on the request path.
    pub fn new(client: EnclaveClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyResolver for LiveKeyResolver {
    async fn resolve(&self, identity: &User) -> Result<VerificationKey, KeyResolveError> {
        if identity.enclave_url.is_empty() {
            return Err(KeyResolveError::NotFound(format!(
                "user {} has no enclave",
                identity.id
            )));
        }
        self.client
            .fetch_verification_key(&identity.enclave_url)
            .await
            .map_err(|e| KeyResolveError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn activated_user(enclave_url: &str, key: &str) -> User {
        let mut user = User::new("aliceid", "Alice", "alice@example.com");
        user.enclave_url = enclave_url.to_string();
        user.verification_key = key.to_string();
        user
    }

    #[tokio::test]
    async fn persisted_reads_stored_hex() {
        let key = [9u8; 32];
        let user = activated_user("https://enclave.test", &alloy::hex::encode(key));

        let resolved = PersistedKeyResolver.resolve(&user).await.unwrap();
        assert_eq!(resolved.as_bytes(), &key);
    }

    #[tokio::test]
    async fn persisted_without_key_is_not_found() {
        let user = User::new("aliceid", "Alice", "alice@example.com");
        assert!(matches!(
            PersistedKeyResolver.resolve(&user).await,
            Err(KeyResolveError::NotFound(_))
        ));

        let corrupt = activated_user("https://enclave.test", "not-hex");
        assert!(matches!(
            PersistedKeyResolver.resolve(&corrupt).await,
            Err(KeyResolveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn live_fetches_current_key() {
        let server = MockServer::start().await;
        let rotated = [4u8; 32];
        Mock::given(method("GET"))
            .and(path("/jwt-verification-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verification_key": STANDARD.encode(rotated),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = LiveKeyResolver::new(EnclaveClient::new(Duration::from_secs(2)).unwrap());
        let user = activated_user(&server.uri(), &alloy::hex::encode([1u8; 32]));

        let resolved = resolver.resolve(&user).await.unwrap();
        assert_eq!(resolved.as_bytes(), &rotated);
    }

    #[tokio::test]
    async fn live_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwt-verification-key"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let resolver = LiveKeyResolver::new(EnclaveClient::new(Duration::from_secs(2)).unwrap());
        let user = activated_user(&server.uri(), "");
        assert!(matches!(
            resolver.resolve(&user).await,
            Err(KeyResolveError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn live_without_enclave_is_not_found() {
        let resolver = LiveKeyResolver::new(EnclaveClient::new(Duration::from_secs(2)).unwrap());
        let user = User::new("aliceid", "Alice", "alice@example.com");
        assert!(matches!(
            resolver.resolve(&user).await,
            Err(KeyResolveError::NotFound(_))
        ));
    }
}
