// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for the router-level tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Request, StatusCode,
    },
};
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use k256::ecdsa::SigningKey;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use url::Url;

use elonwallet_backend::{
    api::router,
    auth::{AuthenticationGuard, PersistedKeyResolver, VerificationKey, BACKEND_AUDIENCE, ENCLAVE_ISSUER},
    enclave::{DeployerClient, EnclaveClient},
    mailer::{MailError, Mailer},
    models::User,
    state::{AppState, InFlight},
    storage::{Database, TransactionScope},
    wallet::{eip191, ChallengeStore},
};

// =============================================================================
// Session keys
// =============================================================================

/// Ed25519 key an enclave would sign sessions with.
pub struct TestKeypair {
    public_key: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    pub fn new(seed: u8) -> Self {
        let seed_bytes = [seed; 32];
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).unwrap();
        Self {
            public_key: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey::from_bytes(&self.public_key).unwrap()
    }

    /// Public key as the enclave publishes it.
    pub fn public_key_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.public_key)
    }

    pub fn session(&self, email: &str, scope: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "iss": ENCLAVE_ISSUER,
            "aud": BACKEND_AUDIENCE,
            "sub": email,
            "scope": scope,
            "iat": now,
            "exp": now + 3600,
        });
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(&Header::new(Algorithm::EdDSA), &claims, &encoding_key).unwrap()
    }
}

fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = vec![0x30, 0x2e, 0x02, 0x01, 0x00];
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}

// =============================================================================
// Wallet signatures
// =============================================================================

pub fn wallet_key(byte: u8) -> SigningKey {
    SigningKey::from_slice(&[byte; 32]).unwrap()
}

pub fn wallet_address(key: &SigningKey) -> String {
    eip191::address_from_key(key.verifying_key())
}

/// `personal_sign(message)` with `v` in 27/28 form.
pub fn personal_sign(key: &SigningKey, message: &[u8]) -> String {
    let digest = eip191::personal_message_digest(message);
    let (signature, recovery_id) = key.sign_prehash_recoverable(&digest).unwrap();
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(27 + recovery_id.to_byte());
    format!("0x{}", alloy::hex::encode(bytes))
}

// =============================================================================
// Mail
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every following send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Status(503));
        }
        self.sent.lock().unwrap().push(SentMail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Activation secret from the link in an activation mail.
pub fn activation_secret(mail: &SentMail) -> String {
    let link = mail
        .body
        .lines()
        .find(|line| line.starts_with("https://"))
        .expect("activation mail contains a link");
    let link = Url::parse(link.trim()).unwrap();
    link.query_pairs()
        .find(|(name, _)| name == "activation_string")
        .map(|(_, value)| value.into_owned())
        .expect("link carries the activation secret")
}

// =============================================================================
// Application
// =============================================================================

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new(deployer_url: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        let mailer = Arc::new(RecordingMailer::default());

        let state = AppState {
            transactions: TransactionScope::new(db, CancellationToken::new()),
            auth: AuthenticationGuard::new(Arc::new(PersistedKeyResolver)),
            challenges: ChallengeStore::new(),
            deployer: DeployerClient::new(deployer_url).unwrap(),
            enclaves: EnclaveClient::new(Duration::from_secs(5)).unwrap(),
            mailer: mailer.clone(),
            frontend_url: Url::parse("https://app.elonwallet.io").unwrap(),
            activations: InFlight::new(),
        };

        Self {
            state,
            mailer,
            _dir: dir,
        }
    }

    /// Insert an activated user whose sessions are signed by `keypair`.
    pub async fn seed_user(&self, id: &str, name: &str, email: &str, keypair: &TestKeypair) {
        let user = User::new(id, name, email);
        let key = keypair.verification_key().to_hex();
        self.state
            .transactions
            .run(|tx| async move {
                let txn = tx.lock().await?;
                txn.users().create(&user)?;
                txn.users()
                    .set_enclave(&user.id, "http://enclave.invalid", &key)
            })
            .await
            .unwrap();
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}
