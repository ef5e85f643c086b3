// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Scope
//!
//! Every unit of work (one HTTP request, one phase of a worker iteration)
//! runs inside at most one redb write transaction:
//!
//! ```text
//! work(TxHandle) ──► lock() opens the transaction on first use
//!       │
//!       ├─► Ok  ──► commit
//!       └─► Err ──► rollback ──► Err(Work(e))
//! ```
//!
//! redb admits a single writer. The transaction is therefore opened lazily:
//! anything the work does before its first [`TxHandle::lock`] (authentication,
//! calls to the deployer or an enclave) holds no lock. Work that only reads
//! uses a [`Snapshot`] instead, which never waits for the writer.
//!
//! Never keep a `&Transaction` or a repository alive across an `.await`; hold
//! the guard instead.
//!
//! A failed rollback means the database can no longer be trusted. It is
//! reported as [`ScopeError::RollbackFailed`] and cancels the process-wide
//! fatal token so the host can shut down in order.

use std::future::Future;
use std::sync::Arc;

use redb::{ReadTransaction, ReadableDatabase, WriteTransaction};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::database::{Database, StoreError, StoreResult};
use super::repository::{
    NotificationReader, NotificationRepository, SignupReader, SignupRepository, UserReader,
    UserRepository,
};

// =============================================================================
// Transaction
// =============================================================================

/// One open write transaction plus repository accessors.
pub struct Transaction {
    txn: WriteTransaction,
}

impl Transaction {
    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.txn)
    }

    pub fn signups(&self) -> SignupRepository<'_> {
        SignupRepository::new(&self.txn)
    }

    pub fn notifications(&self) -> NotificationRepository<'_> {
        NotificationRepository::new(&self.txn)
    }
}

/// Shared handle to the transaction of the current unit of work.
#[derive(Clone)]
pub struct TxHandle {
    slot: Arc<Mutex<Option<Transaction>>>,
    db: Database,
}

impl TxHandle {
    fn new(db: Database) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            db,
        }
    }

    /// Exclusive access to the transaction, opening it on first use.
    pub async fn lock(&self) -> StoreResult<MappedMutexGuard<'_, Transaction>> {
        let mut slot = self.slot.lock().await;
        if slot.is_none() {
            *slot = Some(begin_write(&self.db).await?);
        }
        MutexGuard::try_map(slot, |slot| slot.as_mut())
            .map_err(|_| StoreError::Task("transaction slot is empty".to_string()))
    }

    /// `None` while clones are alive; `Some(None)` if the work never wrote.
    fn into_inner(self) -> Option<Option<Transaction>> {
        Arc::try_unwrap(self.slot).ok().map(Mutex::into_inner)
    }
}

/// Consistent read-only view of the committed database.
pub struct Snapshot {
    txn: ReadTransaction,
}

impl Snapshot {
    pub fn users(&self) -> UserReader<'_> {
        UserReader::new(&self.txn)
    }

    pub fn signups(&self) -> SignupReader<'_> {
        SignupReader::new(&self.txn)
    }

    pub fn notifications(&self) -> NotificationReader<'_> {
        NotificationReader::new(&self.txn)
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ScopeError<E> {
    #[error("unit of work failed")]
    Work(E),

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] StoreError),

    /// The work returned while a clone of its handle was still alive.
    #[error("transaction handle still in use after the unit of work returned")]
    InUse,

    #[error("failed to roll back transaction: {0}")]
    RollbackFailed(#[source] StoreError),
}

impl<E> ScopeError<E> {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScopeError::RollbackFailed(_))
    }
}

// =============================================================================
// Scope
// =============================================================================

/// Runs units of work against the database, one transaction each.
#[derive(Clone)]
pub struct TransactionScope {
    db: Database,
    fatal: CancellationToken,
}

impl TransactionScope {
    /// `fatal` is cancelled when a rollback fails.
    pub fn new(db: Database, fatal: CancellationToken) -> Self {
        Self { db, fatal }
    }

    /// Run `work` with a lazily opened transaction, committing on `Ok` and
    /// rolling back on `Err`.
    pub async fn run<T, E, F, Fut>(&self, work: F) -> Result<T, ScopeError<E>>
    where
        F: FnOnce(TxHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let handle = TxHandle::new(self.db.clone());
        let outcome = work(handle.clone()).await;

        let Some(slot) = handle.into_inner() else {
            // Remaining clones drop the transaction, which aborts it.
            error!("Transaction handle escaped its unit of work; discarding transaction");
            return Err(ScopeError::InUse);
        };
        let Some(txn) = slot else {
            return outcome.map_err(ScopeError::Work);
        };

        match outcome {
            Ok(value) => {
                commit(txn).await.map_err(ScopeError::Commit)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = rollback(txn).await {
                    error!(error = %rollback, "Transaction rollback failed; signalling shutdown");
                    self.fatal.cancel();
                    return Err(ScopeError::RollbackFailed(rollback));
                }
                Err(ScopeError::Work(e))
            }
        }
    }

    /// Read-only view of the last committed state. Never waits for the writer.
    pub fn snapshot(&self) -> StoreResult<Snapshot> {
        Ok(Snapshot {
            txn: self.db.raw().begin_read()?,
        })
    }

    /// Open and immediately abort a write transaction. Used by readiness checks.
    pub async fn check_writer(&self) -> StoreResult<()> {
        let txn = begin_write(&self.db).await?;
        rollback(txn).await
    }
}

async fn begin_write(db: &Database) -> StoreResult<Transaction> {
    let db = db.raw();
    let txn = tokio::task::spawn_blocking(move || db.begin_write())
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;
    Ok(Transaction { txn })
}

async fn commit(txn: Transaction) -> StoreResult<()> {
    tokio::task::spawn_blocking(move || txn.txn.commit())
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;
    Ok(())
}

async fn rollback(txn: Transaction) -> StoreResult<()> {
    tokio::task::spawn_blocking(move || txn.txn.abort())
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;
    Ok(())
}
