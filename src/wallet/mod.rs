// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Ownership
//!
//! Proves control of an on-chain address without seeing its private key:
//!
//! 1. [`initialize`]: the caller names an address and receives a random nonce
//! 2. the wallet signs the nonce with `personal_sign` (EIP-191)
//! 3. [`finalize`]: the signer is recovered from the signature; if it is the
//!    claimed address, the wallet is registered to the caller inside the
//!    request transaction
//!
//! Initialization only reads, so it works on a snapshot and never waits for
//! the writer.
//!
//! A challenge is consumed by the first finalize attempt, successful or not.

pub mod challenge;
pub mod eip191;

pub use challenge::{ChallengeStore, EntropyError, CHALLENGE_TTL};

use crate::models::{is_valid_address, normalize_address, Wallet};
use crate::storage::{StoreError, TransactionScope, TxHandle};

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("invalid address")]
    InvalidAddress,

    #[error("wallet name must not be empty")]
    InvalidName,

    #[error("wallet is already registered")]
    AlreadyRegistered,

    #[error("no challenge requested")]
    NoChallenge,

    #[error("invalid signature")]
    InvalidSignature,

    #[error(transparent)]
    Entropy(#[from] EntropyError),

    #[error(transparent)]
    Storage(StoreError),
}

/// Issue a challenge for `address`.
///
/// Fails if the address already belongs to any user.
pub async fn initialize(
    challenges: &ChallengeStore,
    store: &TransactionScope,
    address: &str,
) -> Result<String, ChallengeError> {
    if !is_valid_address(address) {
        return Err(ChallengeError::InvalidAddress);
    }

    let owner = store
        .snapshot()
        .and_then(|snapshot| snapshot.users().wallet_owner(address))
        .map_err(ChallengeError::Storage)?;
    if owner.is_some() {
        return Err(ChallengeError::AlreadyRegistered);
    }

    let nonce = challenges.issue(address).await?;
    tracing::debug!(address = %normalize_address(address), "Wallet challenge issued");
    Ok(nonce)
}

/// Redeem the challenge for `address` and register the wallet to `user_id`.
pub async fn finalize(
    challenges: &ChallengeStore,
    tx: &TxHandle,
    user_id: &str,
    address: &str,
    signature: &str,
    name: &str,
) -> Result<Wallet, ChallengeError> {
    if !is_valid_address(address) {
        return Err(ChallengeError::InvalidAddress);
    }
    if name.trim().is_empty() {
        return Err(ChallengeError::InvalidName);
    }

    let nonce = challenges
        .take(address)
        .await
        .ok_or(ChallengeError::NoChallenge)?;

    let recovered = eip191::recover_address(nonce.as_bytes(), signature).map_err(|e| {
        tracing::debug!(error = %e, "Unusable wallet signature");
        ChallengeError::InvalidSignature
    })?;
    if recovered != normalize_address(address) {
        return Err(ChallengeError::InvalidSignature);
    }

    let wallet = Wallet {
        name: name.to_string(),
        address: address.to_string(),
    };
    {
        let txn = tx.lock().await.map_err(ChallengeError::Storage)?;
        txn.users()
            .add_wallet(user_id, &wallet)
            .map_err(|e| match e {
                StoreError::Conflict(_) => ChallengeError::AlreadyRegistered,
                other => ChallengeError::Storage(other),
            })?;
    }

    tracing::info!(user_id = %user_id, address = %recovered, "Wallet ownership proven");
    Ok(wallet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::storage::{Database, ScopeError, TransactionScope};
    use k256::ecdsa::SigningKey;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        scope: TransactionScope,
        challenges: ChallengeStore,
        signer: SigningKey,
        address: String,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        let scope = TransactionScope::new(db, CancellationToken::new());
        scope
            .run(|tx| async move {
                let txn = tx.lock().await?;
                txn.users().create(&User::new("alice", "Alice", "alice@example.com"))?;
                txn.users().create(&User::new("bob", "Bob", "bob@example.com"))
            })
            .await
            .unwrap();

        let signer = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let address = eip191::address_from_key(signer.verifying_key()).to_uppercase().replace("0X", "0x");
        Fixture {
            scope,
            challenges: ChallengeStore::new(),
            signer,
            address,
            _dir: dir,
        }
    }

    async fn init(f: &Fixture, address: &str) -> Result<String, ChallengeError> {
        initialize(&f.challenges, &f.scope, address).await
    }

    async fn fin(f: &Fixture, user: &str, signature: &str) -> Result<Wallet, ChallengeError> {
        let challenges = f.challenges.clone();
        let (user, address, signature) = (user.to_string(), f.address.clone(), signature.to_string());
        f.scope
            .run(|tx| async move {
                finalize(&challenges, &tx, &user, &address, &signature, "main").await
            })
            .await
            .map_err(unwrap_work)
    }

    fn unwrap_work(e: ScopeError<ChallengeError>) -> ChallengeError {
        match e {
            ScopeError::Work(e) => e,
            other => panic!("unexpected scope error: {other}"),
        }
    }

    #[tokio::test]
    async fn full_ownership_proof() {
        let f = fixture().await;
        let nonce = init(&f, &f.address).await.unwrap();
        let signature = eip191::tests::personal_sign(&f.signer, nonce.as_bytes());

        let wallet = fin(&f, "alice", &signature).await.unwrap();
        assert_eq!(wallet.address, f.address);

        let owner = f
            .scope
            .snapshot()
            .unwrap()
            .users()
            .wallet_owner(&f.address.to_lowercase())
            .unwrap();
        assert_eq!(owner.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn finalize_without_challenge() {
        let f = fixture().await;
        let signature = eip191::tests::personal_sign(&f.signer, b"anything");
        assert!(matches!(
            fin(&f, "alice", &signature).await,
            Err(ChallengeError::NoChallenge)
        ));
    }

    #[tokio::test]
    async fn challenge_is_consumed_by_failed_attempt() {
        let f = fixture().await;
        let nonce = init(&f, &f.address).await.unwrap();

        let other = SigningKey::from_slice(&[0x07; 32]).unwrap();
        let wrong = eip191::tests::personal_sign(&other, nonce.as_bytes());
        assert!(matches!(
            fin(&f, "alice", &wrong).await,
            Err(ChallengeError::InvalidSignature)
        ));

        let right = eip191::tests::personal_sign(&f.signer, nonce.as_bytes());
        assert!(matches!(
            fin(&f, "alice", &right).await,
            Err(ChallengeError::NoChallenge)
        ));
    }

    #[tokio::test]
    async fn nonce_is_bound_to_its_address() {
        let f = fixture().await;
        let nonce = init(&f, &f.address).await.unwrap();

        // A structurally valid proof over A's nonce, presented for B.
        let other = SigningKey::from_slice(&[0x07; 32]).unwrap();
        let other_address = eip191::address_from_key(other.verifying_key());
        let signature = eip191::tests::personal_sign(&other, nonce.as_bytes());
        let challenges = f.challenges.clone();
        let result = f
            .scope
            .run(|tx| async move {
                finalize(&challenges, &tx, "alice", &other_address, &signature, "main").await
            })
            .await
            .map_err(unwrap_work);
        assert!(matches!(result, Err(ChallengeError::NoChallenge)));

        // A's challenge is still pending.
        assert_eq!(f.challenges.len().await, 1);
    }

    #[tokio::test]
    async fn registered_address_cannot_be_challenged_again() {
        let f = fixture().await;
        let nonce = init(&f, &f.address).await.unwrap();
        let signature = eip191::tests::personal_sign(&f.signer, nonce.as_bytes());
        fin(&f, "alice", &signature).await.unwrap();

        assert!(matches!(
            init(&f, &f.address.to_lowercase()).await,
            Err(ChallengeError::AlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn invalid_address_is_rejected_before_storage() {
        let f = fixture().await;
        assert!(matches!(
            init(&f, "0x1234").await,
            Err(ChallengeError::InvalidAddress)
        ));
        assert!(f.challenges.is_empty().await);
    }
}
