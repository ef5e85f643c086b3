// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client for the enclave deployer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::EnclaveError;

/// Deployment can take a while; the deployer answers once the enclave is up.
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct DeployRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct DeployResponse {
    url: String,
}

#[derive(Debug, Clone)]
pub struct DeployerClient {
    base_url: String,
    http: reqwest::Client,
}

impl DeployerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, EnclaveError> {
        let http = reqwest::Client::builder()
            .timeout(DEPLOY_TIMEOUT)
            .build()
            .map_err(|e| EnclaveError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Deploy an enclave named `name` and return its base URL.
    pub async fn deploy_enclave(&self, name: &str) -> Result<String, EnclaveError> {
        let url = format!("{}/enclaves", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(&DeployRequest { name })
            .send()
            .await
            .map_err(|e| EnclaveError::Request(format!("POST {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EnclaveError::Status(response.status().as_u16()));
        }

        let body: DeployResponse = response
            .json()
            .await
            .map_err(|e| EnclaveError::InvalidResponse(format!("invalid JSON: {e}")))?;
        if body.url.trim().is_empty() {
            return Err(EnclaveError::InvalidResponse(
                "deploy response did not include url".to_string(),
            ));
        }

        tracing::info!(enclave = %name, url = %body.url, "Enclave deployed");
        Ok(body.url)
    }

    /// Remove the enclave named `name`.
    pub async fn remove_enclave(&self, name: &str) -> Result<(), EnclaveError> {
        let url = format!("{}/enclaves/{}", self.base_url, name);
        let response = self
            .http
            .delete(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| EnclaveError::Request(format!("DELETE {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EnclaveError::Status(response.status().as_u16()));
        }

        tracing::info!(enclave = %name, "Enclave removed");
        Ok(())
    }
}
