// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent account state in a single redb file under `DATA_DIR`.
//!
//! ## Layers
//!
//! - [`database`]: the file handle, table definitions and [`StoreError`]
//! - [`transaction`]: at most one write transaction per unit of work, opened
//!   on first use, with commit on success and rollback on failure; read-only
//!   snapshots for lookups
//! - [`repository`]: typed access to users, signups and notifications bound
//!   to an open transaction
//!
//! redb admits a single writer at a time, so foreground requests and the
//! notification worker serialize on the write lock. Nothing holds it across
//! network I/O.

pub mod database;
pub mod repository;
pub mod transaction;

pub use database::{Database, StoreError, StoreResult};
pub use repository::{
    AttemptOutcome, NotificationReader, NotificationRepository, SignupReader, SignupRepository,
    UserReader, UserRepository, BATCH_SIZE, MAX_DELIVERY_ATTEMPTS,
};
pub use transaction::{ScopeError, Snapshot, Transaction, TransactionScope, TxHandle};
