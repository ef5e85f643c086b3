// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the account database.
//!
//! Each repository borrows one open write transaction and reads or writes
//! its tables through it; nothing here commits. The `*Reader` types serve the
//! same lookups from a read transaction.

pub mod notifications;
pub mod signups;
pub mod users;

pub use notifications::{
    AttemptOutcome, NotificationReader, NotificationRepository, BATCH_SIZE, MAX_DELIVERY_ATTEMPTS,
};
pub use signups::{SignupReader, SignupRepository};
pub use users::{UserReader, UserRepository};
