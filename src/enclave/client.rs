// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client for a user's enclave.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

use super::EnclaveError;
use crate::auth::VerificationKey;

/// Body of `GET <enclave>/jwt-verification-key`; the key is base64 encoded.
#[derive(Debug, Deserialize)]
struct VerificationKeyResponse {
    verification_key: String,
}

#[derive(Debug, Clone)]
pub struct EnclaveClient {
    http: reqwest::Client,
}

impl EnclaveClient {
    /// Every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, EnclaveError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnclaveError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Fetch the key the enclave at `enclave_url` signs session tokens with.
    pub async fn fetch_verification_key(
        &self,
        enclave_url: &str,
    ) -> Result<VerificationKey, EnclaveError> {
        let url = format!("{}/jwt-verification-key", enclave_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EnclaveError::Request(format!("GET {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EnclaveError::Status(response.status().as_u16()));
        }

        let body: VerificationKeyResponse = response
            .json()
            .await
            .map_err(|e| EnclaveError::InvalidResponse(format!("invalid JSON: {e}")))?;
        let raw = STANDARD
            .decode(body.verification_key.as_bytes())
            .map_err(|e| EnclaveError::InvalidResponse(format!("invalid base64 key: {e}")))?;

        VerificationKey::from_bytes(&raw).map_err(|e| EnclaveError::InvalidResponse(e.to_string()))
    }
}
