// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded account database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized `UserRecord`
//! - `user_emails`: email → user_id (uniqueness + lookup)
//! - `wallets`: lowercase address → serialized `WalletRecord`
//! - `user_wallets`: `user_id|name` → lowercase address
//! - `contacts`: `user_id|contact_id` → contact_id
//! - `signups`: user_id → serialized `Signup`
//! - `notifications`: id → serialized `Notification`
//! - `notification_queue`: `creation_time_be|id_be` → id (oldest first)
//! - `notification_series`: `series_id|id` → id
//! - `dead_letters`: id → serialized `Notification` (attempts exhausted)
//! - `counters`: name → u64 sequence value

use std::path::Path;
use std::sync::Arc;

use redb::TableDefinition;

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

pub(crate) const USER_EMAILS: TableDefinition<&str, &str> = TableDefinition::new("user_emails");

pub(crate) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

pub(crate) const USER_WALLETS: TableDefinition<&str, &str> = TableDefinition::new("user_wallets");

pub(crate) const CONTACTS: TableDefinition<&str, &str> = TableDefinition::new("contacts");

pub(crate) const SIGNUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("signups");

pub(crate) const NOTIFICATIONS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("notifications");

pub(crate) const NOTIFICATION_QUEUE: TableDefinition<&[u8], u64> =
    TableDefinition::new("notification_queue");

pub(crate) const NOTIFICATION_SERIES: TableDefinition<&str, u64> =
    TableDefinition::new("notification_series");

pub(crate) const DEAD_LETTERS: TableDefinition<u64, &[u8]> = TableDefinition::new("dead_letters");

pub(crate) const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Database
// =============================================================================

/// Handle to the embedded database file. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    inner: Arc<redb::Database>,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later transactions never hit a missing table
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAILS)?;
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(USER_WALLETS)?;
            let _ = write_txn.open_table(CONTACTS)?;
            let _ = write_txn.open_table(SIGNUPS)?;
            let _ = write_txn.open_table(NOTIFICATIONS)?;
            let _ = write_txn.open_table(NOTIFICATION_QUEUE)?;
            let _ = write_txn.open_table(NOTIFICATION_SERIES)?;
            let _ = write_txn.open_table(DEAD_LETTERS)?;
            let _ = write_txn.open_table(COUNTERS)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Account database opened");

        Ok(Self {
            inner: Arc::new(db),
        })
    }

    pub(crate) fn raw(&self) -> Arc<redb::Database> {
        Arc::clone(&self.inner)
    }
}

// =============================================================================
// Key Helpers
// =============================================================================

/// Composite key `owner|item`, used for per-owner prefix scans.
pub(crate) fn pair_key(owner: &str, item: &str) -> String {
    format!("{owner}|{item}")
}

/// Prefix matching every `pair_key(owner, _)`.
pub(crate) fn pair_prefix(owner: &str) -> String {
    format!("{owner}|")
}

/// Queue key ordering notifications by creation time, then id.
///
/// Negative timestamps clamp to zero; they never occur for rows created here.
pub(crate) fn queue_key(creation_time: i64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&(creation_time.max(0) as u64).to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}
