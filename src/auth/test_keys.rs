// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deterministic Ed25519 keys for signing test session tokens.

use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};

use super::claims::{BACKEND_AUDIENCE, ENCLAVE_ISSUER};
use super::verifier::VerificationKey;

pub(crate) struct TestKeypair {
    public_key: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    pub(crate) fn new(seed: u8) -> Self {
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).unwrap();
        Self {
            public_key: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    pub(crate) fn verification_key(&self) -> VerificationKey {
        VerificationKey::from_bytes(&self.public_key).unwrap()
    }

    /// Public key as an enclave serves it from `/jwt-verification-key`.
    pub(crate) fn public_key_base64(&self) -> String {
        STANDARD.encode(&self.public_key)
    }

    pub(crate) fn sign(&self, claims: &serde_json::Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(&Header::new(Algorithm::EdDSA), claims, &encoding_key).unwrap()
    }

    /// A currently valid session for `email` with the given scope.
    pub(crate) fn session(&self, email: &str, scope: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        self.sign(&serde_json::json!({
            "iss": ENCLAVE_ISSUER,
            "aud": BACKEND_AUDIENCE,
            "sub": email,
            "scope": scope,
            "iat": now,
            "exp": now + 3600,
        }))
    }
}

/// PKCS#8 v1 document wrapping an Ed25519 seed.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = vec![0x30, 0x2e, 0x02, 0x01, 0x00];
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}
