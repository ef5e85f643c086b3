// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository: identities, their wallets and contacts.
//!
//! Emails are indexed lowercased; wallet addresses are keyed lowercased so
//! ownership checks are case-insensitive.

use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};

use crate::models::{normalize_address, User, Wallet};
use crate::storage::database::{
    pair_key, pair_prefix, StoreError, StoreResult, CONTACTS, USERS, USER_EMAILS, USER_WALLETS,
    WALLETS,
};

/// Row stored in the `users` table. Wallets and contacts live in their own tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: String,
    name: String,
    email: String,
    enclave_url: String,
    verification_key: String,
}

/// Row stored in the `wallets` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalletRecord {
    address: String,
    name: String,
    user_id: String,
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Repository for users, bound to one write transaction.
pub struct UserRepository<'a> {
    txn: &'a WriteTransaction,
}

impl<'a> UserRepository<'a> {
    pub fn new(txn: &'a WriteTransaction) -> Self {
        Self { txn }
    }

    /// Insert a new user.
    ///
    /// # Returns
    /// - `Err(StoreError::Conflict)` if the id or the email is already taken
    pub fn create(&self, user: &User) -> StoreResult<()> {
        let email = email_key(&user.email);
        let mut emails = self.txn.open_table(USER_EMAILS)?;
        let mut users = self.txn.open_table(USERS)?;

        if emails.get(email.as_str())?.is_some() {
            return Err(StoreError::Conflict(format!("User with email {}", user.email)));
        }
        if users.get(user.id.as_str())?.is_some() {
            return Err(StoreError::Conflict(format!("User {}", user.id)));
        }

        let record = UserRecord {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            enclave_url: user.enclave_url.clone(),
            verification_key: user.verification_key.clone(),
        };
        let json = serde_json::to_vec(&record)?;
        users.insert(user.id.as_str(), json.as_slice())?;
        emails.insert(email.as_str(), user.id.as_str())?;
        Ok(())
    }

    pub fn get_by_id(&self, user_id: &str) -> StoreResult<User> {
        let record = self.record(user_id)?;
        assemble(
            record,
            &self.txn.open_table(USER_WALLETS)?,
            &self.txn.open_table(WALLETS)?,
            &self.txn.open_table(CONTACTS)?,
        )
    }

    pub fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let user_id = lookup_email(&self.txn.open_table(USER_EMAILS)?, email)?;
        self.get_by_id(&user_id)
    }

    /// Bind the deployed enclave and its verification key to a user.
    pub fn set_enclave(
        &self,
        user_id: &str,
        enclave_url: &str,
        verification_key: &str,
    ) -> StoreResult<()> {
        let mut record = self.record(user_id)?;
        record.enclave_url = enclave_url.to_string();
        record.verification_key = verification_key.to_string();

        let json = serde_json::to_vec(&record)?;
        let mut users = self.txn.open_table(USERS)?;
        users.insert(user_id, json.as_slice())?;
        Ok(())
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Register a wallet for a user.
    ///
    /// # Returns
    /// - `Err(StoreError::NotFound)` if the user does not exist
    /// - `Err(StoreError::Conflict)` if the address belongs to anyone already,
    ///   or the user already has a wallet with that name
    pub fn add_wallet(&self, user_id: &str, wallet: &Wallet) -> StoreResult<()> {
        self.record(user_id)?;

        let address = normalize_address(&wallet.address);
        let name_key = pair_key(user_id, &wallet.name);
        let mut wallets = self.txn.open_table(WALLETS)?;
        let mut by_user = self.txn.open_table(USER_WALLETS)?;

        if wallets.get(address.as_str())?.is_some() {
            return Err(StoreError::Conflict(format!("Wallet {address}")));
        }
        if by_user.get(name_key.as_str())?.is_some() {
            return Err(StoreError::Conflict(format!("Wallet named {}", wallet.name)));
        }

        let record = WalletRecord {
            address: wallet.address.clone(),
            name: wallet.name.clone(),
            user_id: user_id.to_string(),
        };
        let json = serde_json::to_vec(&record)?;
        wallets.insert(address.as_str(), json.as_slice())?;
        by_user.insert(name_key.as_str(), address.as_str())?;
        Ok(())
    }

    /// Id of the user owning `address`, compared case-insensitively.
    pub fn wallet_owner(&self, address: &str) -> StoreResult<Option<String>> {
        find_owner(&self.txn.open_table(WALLETS)?, address)
    }

    // =========================================================================
    // Contacts
    // =========================================================================

    pub fn add_contact(&self, user_id: &str, contact_id: &str) -> StoreResult<()> {
        let key = pair_key(user_id, contact_id);
        let mut contacts = self.txn.open_table(CONTACTS)?;
        if contacts.get(key.as_str())?.is_some() {
            return Err(StoreError::Conflict(format!("Contact {contact_id}")));
        }
        contacts.insert(key.as_str(), contact_id)?;
        Ok(())
    }

    pub fn remove_contact(&self, user_id: &str, contact_id: &str) -> StoreResult<()> {
        let key = pair_key(user_id, contact_id);
        let mut contacts = self.txn.open_table(CONTACTS)?;
        let removed = contacts.remove(key.as_str())?.is_some();
        if removed {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("Contact {contact_id}")))
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn record(&self, user_id: &str) -> StoreResult<UserRecord> {
        load_record(&self.txn.open_table(USERS)?, user_id)
    }
}

/// Read-only user lookups against a committed snapshot.
pub struct UserReader<'a> {
    txn: &'a ReadTransaction,
}

impl<'a> UserReader<'a> {
    pub fn new(txn: &'a ReadTransaction) -> Self {
        Self { txn }
    }

    pub fn get_by_id(&self, user_id: &str) -> StoreResult<User> {
        let record = load_record(&self.txn.open_table(USERS)?, user_id)?;
        assemble(
            record,
            &self.txn.open_table(USER_WALLETS)?,
            &self.txn.open_table(WALLETS)?,
            &self.txn.open_table(CONTACTS)?,
        )
    }

    pub fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let user_id = lookup_email(&self.txn.open_table(USER_EMAILS)?, email)?;
        self.get_by_id(&user_id)
    }

    pub fn wallet_owner(&self, address: &str) -> StoreResult<Option<String>> {
        find_owner(&self.txn.open_table(WALLETS)?, address)
    }
}

// =============================================================================
// Table helpers shared by both views
// =============================================================================

fn load_record(
    users: &impl ReadableTable<&'static str, &'static [u8]>,
    user_id: &str,
) -> StoreResult<UserRecord> {
    match users.get(user_id)? {
        Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
        None => Err(StoreError::NotFound(format!("User {user_id}"))),
    }
}

fn lookup_email(
    emails: &impl ReadableTable<&'static str, &'static str>,
    email: &str,
) -> StoreResult<String> {
    match emails.get(email_key(email).as_str())? {
        Some(id) => Ok(id.value().to_string()),
        None => Err(StoreError::NotFound(format!("User with email {email}"))),
    }
}

fn find_owner(
    wallets: &impl ReadableTable<&'static str, &'static [u8]>,
    address: &str,
) -> StoreResult<Option<String>> {
    match wallets.get(normalize_address(address).as_str())? {
        Some(bytes) => {
            let record: WalletRecord = serde_json::from_slice(bytes.value())?;
            Ok(Some(record.user_id))
        }
        None => Ok(None),
    }
}

/// Values of every `user_id|…` key in a pair-keyed table.
fn pair_values(
    table: &impl ReadableTable<&'static str, &'static str>,
    user_id: &str,
) -> StoreResult<Vec<String>> {
    let prefix = pair_prefix(user_id);
    let mut values = Vec::new();
    for entry in table.range(prefix.as_str()..)? {
        let (key, value) = entry?;
        if !key.value().starts_with(&prefix) {
            break;
        }
        values.push(value.value().to_string());
    }
    Ok(values)
}

fn assemble(
    record: UserRecord,
    user_wallets: &impl ReadableTable<&'static str, &'static str>,
    wallets: &impl ReadableTable<&'static str, &'static [u8]>,
    contacts: &impl ReadableTable<&'static str, &'static str>,
) -> StoreResult<User> {
    let addresses = pair_values(user_wallets, &record.id)?;
    let mut owned = Vec::with_capacity(addresses.len());
    for address in &addresses {
        if let Some(bytes) = wallets.get(address.as_str())? {
            let stored: WalletRecord = serde_json::from_slice(bytes.value())?;
            owned.push(Wallet {
                name: stored.name,
                address: stored.address,
            });
        }
    }
    let contacts = pair_values(contacts, &record.id)?;

    Ok(User {
        id: record.id,
        name: record.name,
        email: record.email,
        wallets: owned,
        enclave_url: record.enclave_url,
        contacts,
        verification_key: record.verification_key,
    })
}
