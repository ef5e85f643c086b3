// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request authentication.
//!
//! ```text
//! NoToken ─► TokenPresent ─► SubjectResolved ─► KeyResolved ─► Verified
//!    │             │                │                 │
//!    └─────────────┴────────────────┴─────────────────┴──► Rejected
//! ```
//!
//! The subject is read from the token before its signature is checked, only
//! to find the account and its key. The signature check that follows covers
//! the subject too.
//!
//! The account is read from a snapshot, so a slow enclave on the key fetch
//! never holds the database writer.

use std::sync::Arc;

use super::claims::{AuthenticatedUser, Scope};
use super::error::AuthError;
use super::resolver::{KeyResolveError, KeyResolver};
use super::verifier::{unverified_subject, ClaimsVerifier};
use crate::storage::{StoreError, TransactionScope};

/// `"Bearer "` plus at least one token character.
const MIN_HEADER_LEN: usize = 8;

#[derive(Clone)]
pub struct AuthenticationGuard {
    verifier: ClaimsVerifier,
    resolver: Arc<dyn KeyResolver>,
}

impl AuthenticationGuard {
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            verifier: ClaimsVerifier::new(),
            resolver,
        }
    }

    /// Authenticate a request from its `Authorization` header value.
    ///
    pub async fn authenticate(
        &self,
        header: Option<&str>,
        store: &TransactionScope,
        allowed: &[Scope],
    ) -> Result<AuthenticatedUser, AuthError> {
        let header = header.ok_or(AuthError::MissingAuthHeader)?;
        if header.len() < MIN_HEADER_LEN {
            return Err(AuthError::InvalidAuthHeader);
        }
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let subject = unverified_subject(token)?;

        let lookup = store
            .snapshot()
            .and_then(|snapshot| snapshot.users().get_by_email(&subject));
        let user = match lookup {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => return Err(AuthError::UnknownSubject),
            Err(e) => return Err(AuthError::Storage(e)),
        };

        let key = self.resolver.resolve(&user).await.map_err(|e| match e {
            KeyResolveError::NotFound(_) => AuthError::NoVerificationKey,
            KeyResolveError::Transport(msg) => {
                tracing::warn!(user_id = %user.id, error = %msg, "Verification key fetch failed");
                AuthError::KeyUnavailable(msg)
            }
        })?;

        let verified = self.verifier.verify(token, &key, allowed)?;

        Ok(AuthenticatedUser {
            user,
            scope: verified.scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::INVALID_SESSION;
    use crate::auth::resolver::{LiveKeyResolver, PersistedKeyResolver};
    use crate::auth::test_keys::TestKeypair;
    use crate::enclave::EnclaveClient;
    use crate::models::User;
    use crate::storage::Database;
    use axum::response::IntoResponse;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        scope: TransactionScope,
        guard: AuthenticationGuard,
        key: TestKeypair,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        fixture_with(
            "https://alice.enclave.test",
            Arc::new(PersistedKeyResolver),
        )
        .await
    }

    async fn fixture_with(enclave_url: &str, resolver: Arc<dyn KeyResolver>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        let scope = TransactionScope::new(db, CancellationToken::new());
        let key = TestKeypair::new(11);

        let hex = key.verification_key().to_hex();
        let enclave_url = enclave_url.to_string();
        scope
            .run(|tx| async move {
                let txn = tx.lock().await?;
                let mut alice = User::new("aliceid", "Alice", "alice@example.com");
                alice.enclave_url = enclave_url;
                alice.verification_key = hex;
                txn.users().create(&alice)?;
                txn.users()
                    .create(&User::new("bobid", "Bob", "bob@example.com"))
            })
            .await
            .unwrap();

        Fixture {
            scope,
            guard: AuthenticationGuard::new(resolver),
            key,
            _dir: dir,
        }
    }

    async fn authenticate(
        f: &Fixture,
        header: Option<String>,
        allowed: &'static [Scope],
    ) -> Result<AuthenticatedUser, AuthError> {
        f.guard.authenticate(header.as_deref(), &f.scope, allowed).await
    }

    async fn mount_key(server: &MockServer, key: &TestKeypair) {
        Mock::given(method("GET"))
            .and(path("/jwt-verification-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verification_key": key.public_key_base64(),
            })))
            .mount(server)
            .await;
    }

    async fn live_fixture(server: &MockServer, timeout: Duration) -> Fixture {
        let client = EnclaveClient::new(timeout).unwrap();
        fixture_with(&server.uri(), Arc::new(LiveKeyResolver::new(client))).await
    }

    async fn assert_generic_rejection(result: Result<AuthenticatedUser, AuthError>) {
        let err = match result {
            Err(e @ AuthError::KeyUnavailable(_)) => e,
            Err(other) => panic!("expected KeyUnavailable, got {other:?}"),
            Ok(_) => panic!("expected rejection"),
        };
        let response = err.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], INVALID_SESSION);
        assert_eq!(body["error_code"], "invalid_session");
    }

    #[tokio::test]
    async fn valid_session_yields_identity() {
        let f = fixture().await;
        let token = f.key.session("alice@example.com", "user");

        let identity = authenticate(&f, Some(format!("Bearer {token}")), &[Scope::User])
            .await
            .unwrap();
        assert_eq!(identity.user_id(), "aliceid");
        assert_eq!(identity.scope, Some(Scope::User));
    }

    #[tokio::test]
    async fn header_shape_is_checked_first() {
        let f = fixture().await;
        assert!(matches!(
            authenticate(&f, None, &[Scope::User]).await,
            Err(AuthError::MissingAuthHeader)
        ));
        assert!(matches!(
            authenticate(&f, Some("Bearer".into()), &[Scope::User]).await,
            Err(AuthError::InvalidAuthHeader)
        ));
        let token = f.key.session("alice@example.com", "user");
        assert!(matches!(
            authenticate(&f, Some(format!("Token {token}")), &[Scope::User]).await,
            Err(AuthError::InvalidAuthHeader)
        ));
    }

    #[tokio::test]
    async fn unknown_subject_is_rejected() {
        let f = fixture().await;
        let token = f.key.session("mallory@example.com", "user");
        assert!(matches!(
            authenticate(&f, Some(format!("Bearer {token}")), &[Scope::User]).await,
            Err(AuthError::UnknownSubject)
        ));
    }

    #[tokio::test]
    async fn inactive_subject_is_rejected() {
        let f = fixture().await;
        let token = f.key.session("bob@example.com", "user");
        assert!(matches!(
            authenticate(&f, Some(format!("Bearer {token}")), &[Scope::User]).await,
            Err(AuthError::NoVerificationKey)
        ));
    }

    #[tokio::test]
    async fn token_signed_by_another_enclave_is_rejected() {
        let f = fixture().await;
        let forged = TestKeypair::new(99).session("alice@example.com", "user");
        assert!(matches!(
            authenticate(&f, Some(format!("Bearer {forged}")), &[Scope::User]).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn enclave_scope_needs_allowing_route() {
        let f = fixture().await;
        let token = f.key.session("alice@example.com", "enclave");
        let header = Some(format!("Bearer {token}"));

        assert!(matches!(
            authenticate(&f, header.clone(), &[Scope::User]).await,
            Err(AuthError::ScopeNotAllowed)
        ));
        let identity = authenticate(&f, header, &[Scope::User, Scope::Enclave])
            .await
            .unwrap();
        assert_eq!(identity.scope, Some(Scope::Enclave));
    }

    #[tokio::test]
    async fn live_resolver_follows_key_rotation() {
        let server = MockServer::start().await;
        let first = TestKeypair::new(21);
        let rotated = TestKeypair::new(22);
        mount_key(&server, &first).await;
        let f = live_fixture(&server, Duration::from_secs(2)).await;

        let old_session = first.session("alice@example.com", "user");
        let identity = authenticate(&f, Some(format!("Bearer {old_session}")), &[Scope::User])
            .await
            .unwrap();
        assert_eq!(identity.user_id(), "aliceid");

        // The enclave rotates its signing key; the stored key is never consulted.
        server.reset().await;
        mount_key(&server, &rotated).await;

        let new_session = rotated.session("alice@example.com", "user");
        authenticate(&f, Some(format!("Bearer {new_session}")), &[Scope::User])
            .await
            .unwrap();
        assert!(matches!(
            authenticate(&f, Some(format!("Bearer {old_session}")), &[Scope::User]).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn live_resolver_error_status_is_generic_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwt-verification-key"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let f = live_fixture(&server, Duration::from_secs(2)).await;

        let token = TestKeypair::new(21).session("alice@example.com", "user");
        assert_generic_rejection(
            authenticate(&f, Some(format!("Bearer {token}")), &[Scope::User]).await,
        )
        .await;
    }

    #[tokio::test]
    async fn live_resolver_timeout_is_generic_rejection() {
        let server = MockServer::start().await;
        let key = TestKeypair::new(21);
        Mock::given(method("GET"))
            .and(path("/jwt-verification-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "verification_key": key.public_key_base64(),
                    }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let f = live_fixture(&server, Duration::from_millis(200)).await;

        let token = key.session("alice@example.com", "user");
        assert_generic_rejection(
            authenticate(&f, Some(format!("Bearer {token}")), &[Scope::User]).await,
        )
        .await;
    }

    #[tokio::test]
    async fn slow_key_fetch_does_not_hold_the_writer() {
        let server = MockServer::start().await;
        let key = TestKeypair::new(21);
        Mock::given(method("GET"))
            .and(path("/jwt-verification-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "verification_key": key.public_key_base64(),
                    }))
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;
        let f = Arc::new(live_fixture(&server, Duration::from_secs(5)).await);

        let pending = {
            let f = Arc::clone(&f);
            let token = key.session("alice@example.com", "user");
            tokio::spawn(async move {
                authenticate(&f, Some(format!("Bearer {token}")), &[Scope::User]).await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        f.scope
            .run(|tx| async move {
                let txn = tx.lock().await?;
                txn.users()
                    .create(&User::new("carolid", "Carol", "carol@example.com"))
            })
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(pending.await.unwrap().unwrap().user_id(), "aliceid");
    }
}
