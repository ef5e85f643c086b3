// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pending ownership challenges, shared across requests.
//!
//! At most one challenge is outstanding per address (keyed lowercased).
//! Taking a challenge removes it under the same lock as the lookup, so two
//! concurrent finalizations for one address cannot both see it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ring::rand::{SecureRandom, SystemRandom};
use tokio::sync::Mutex;

use crate::models::normalize_address;

/// How long an issued challenge stays redeemable.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(10 * 60);

const NONCE_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
#[error("system randomness unavailable")]
pub struct EntropyError;

struct PendingChallenge {
    nonce: String,
    issued_at: Instant,
}

#[derive(Clone)]
pub struct ChallengeStore {
    pending: Arc<Mutex<HashMap<String, PendingChallenge>>>,
    ttl: Duration,
    rng: SystemRandom,
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::with_ttl(CHALLENGE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            rng: SystemRandom::new(),
        }
    }

    /// Issue a fresh nonce for `address`, replacing any pending one.
    pub async fn issue(&self, address: &str) -> Result<String, EntropyError> {
        let mut bytes = [0u8; NONCE_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| EntropyError)?;
        let nonce = alloy::hex::encode(bytes);

        let mut pending = self.pending.lock().await;
        self.purge_expired(&mut pending);
        pending.insert(
            normalize_address(address),
            PendingChallenge {
                nonce: nonce.clone(),
                issued_at: Instant::now(),
            },
        );
        Ok(nonce)
    }

    /// Remove and return the live challenge for `address`.
    pub async fn take(&self, address: &str) -> Option<String> {
        let mut pending = self.pending.lock().await;
        self.purge_expired(&mut pending);
        pending
            .remove(&normalize_address(address))
            .map(|challenge| challenge.nonce)
    }

    /// Number of live challenges.
    pub async fn len(&self) -> usize {
        let mut pending = self.pending.lock().await;
        self.purge_expired(&mut pending);
        pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn purge_expired(&self, pending: &mut HashMap<String, PendingChallenge>) {
        let ttl = self.ttl;
        pending.retain(|_, challenge| challenge.issued_at.elapsed() < ttl);
    }
}
