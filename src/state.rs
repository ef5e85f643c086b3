// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use crate::auth::AuthenticationGuard;
use crate::enclave::{DeployerClient, EnclaveClient};
use crate::mailer::Mailer;
use crate::storage::TransactionScope;
use crate::wallet::ChallengeStore;

#[derive(Clone)]
pub struct AppState {
    pub transactions: TransactionScope,
    pub auth: AuthenticationGuard,
    pub challenges: ChallengeStore,
    pub deployer: DeployerClient,
    pub enclaves: EnclaveClient,
    pub mailer: Arc<dyn Mailer>,
    /// Base of activation links
    pub frontend_url: Url,
    /// Accounts with an activation currently deploying
    pub activations: InFlight,
}

/// Keys with an operation in progress. A claim is released when dropped.
#[derive(Clone, Default)]
pub struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if `key` is already claimed.
    pub fn try_claim(&self, key: &str) -> Option<InFlightClaim> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(InFlightClaim {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }
}

pub struct InFlightClaim {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive_until_dropped() {
        let in_flight = InFlight::new();
        let claim = in_flight.try_claim("alice@example.com").unwrap();
        assert!(in_flight.try_claim("alice@example.com").is_none());
        assert!(in_flight.try_claim("bob@example.com").is_some());

        drop(claim);
        assert!(in_flight.try_claim("alice@example.com").is_some());
    }
}
