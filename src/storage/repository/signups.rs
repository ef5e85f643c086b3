// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signup repository: activation state, one row per user.

use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::models::Signup;
use crate::storage::database::{StoreError, StoreResult, SIGNUPS};

pub struct SignupRepository<'a> {
    txn: &'a WriteTransaction,
}

impl<'a> SignupRepository<'a> {
    pub fn new(txn: &'a WriteTransaction) -> Self {
        Self { txn }
    }

    /// Insert the signup row for a freshly created user.
    pub fn create(&self, signup: &Signup) -> StoreResult<()> {
        let mut table = self.txn.open_table(SIGNUPS)?;
        if table.get(signup.user_id.as_str())?.is_some() {
            return Err(StoreError::Conflict(format!("Signup for {}", signup.user_id)));
        }
        let json = serde_json::to_vec(signup)?;
        table.insert(signup.user_id.as_str(), json.as_slice())?;
        Ok(())
    }

    pub fn get(&self, user_id: &str) -> StoreResult<Signup> {
        load(&self.txn.open_table(SIGNUPS)?, user_id)
    }

    /// Overwrite an existing signup row.
    pub fn update(&self, signup: &Signup) -> StoreResult<()> {
        let mut table = self.txn.open_table(SIGNUPS)?;
        if table.get(signup.user_id.as_str())?.is_none() {
            return Err(StoreError::NotFound(format!("Signup for {}", signup.user_id)));
        }
        let json = serde_json::to_vec(signup)?;
        table.insert(signup.user_id.as_str(), json.as_slice())?;
        Ok(())
    }
}

/// Read-only signup lookups against a committed snapshot.
pub struct SignupReader<'a> {
    txn: &'a ReadTransaction,
}

impl<'a> SignupReader<'a> {
    pub fn new(txn: &'a ReadTransaction) -> Self {
        Self { txn }
    }

    pub fn get(&self, user_id: &str) -> StoreResult<Signup> {
        load(&self.txn.open_table(SIGNUPS)?, user_id)
    }
}

fn load(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    user_id: &str,
) -> StoreResult<Signup> {
    match table.get(user_id)? {
        Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
        None => Err(StoreError::NotFound(format!("Signup for {user_id}"))),
    }
}
