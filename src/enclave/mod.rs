// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Enclave Collaborators
//!
//! HTTP clients for the two external services that hold key material:
//!
//! - the **deployer**, which starts and removes one enclave per user
//! - each user's **enclave**, which publishes the Ed25519 key its session
//!   tokens are signed with
//!
//! Every non-2xx answer is a hard failure.

pub mod client;
pub mod deployer;

pub use client::EnclaveClient;
pub use deployer::DeployerClient;

#[derive(Debug, thiserror::Error)]
pub enum EnclaveError {
    #[error("enclave request failed: {0}")]
    Request(String),

    #[error("enclave service returned status {0}")]
    Status(u16),

    #[error("enclave response was invalid: {0}")]
    InvalidResponse(String),
}
