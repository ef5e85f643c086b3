// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Models
//!
//! Types shared by the repositories, the authentication guard and the HTTP
//! handlers. All timestamps are Unix seconds.
//!
//! ## Model Categories
//!
//! - **Users**: account identity, wallets, enclave binding and contacts
//! - **Signups**: activation state preceding a live enclave
//! - **Notifications**: scheduled mail, delivered by the background worker
//! - **API**: request and response bodies of the HTTP handlers

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Users
// =============================================================================

/// On-chain wallet registered to a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Wallet {
    /// User-chosen label, unique per user
    pub name: String,
    /// `0x`-prefixed address as submitted by the owner
    pub address: String,
}

/// Account identity.
///
/// `verification_key` and `enclave_url` stay empty until activation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub wallets: Vec<Wallet>,
    pub enclave_url: String,
    /// Ids of users this user has added as contacts
    pub contacts: Vec<String>,
    /// Hex-encoded Ed25519 public key of the user's enclave
    pub verification_key: String,
}

impl User {
    /// A fresh, not yet activated user.
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            wallets: Vec::new(),
            enclave_url: String::new(),
            contacts: Vec::new(),
            verification_key: String::new(),
        }
    }

    /// Whether an enclave has been deployed and bound to this user.
    pub fn is_activated(&self) -> bool {
        !self.enclave_url.is_empty()
    }
}

/// Public view of a user, as returned to other users.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub wallets: Vec<Wallet>,
}

impl From<User> for Contact {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            email: user.email,
            wallets: user.wallets,
        }
    }
}

// =============================================================================
// Signups
// =============================================================================

/// Activation state for a user. At most one row per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signup {
    pub user_id: String,
    pub activated: bool,
    /// 32 random bytes, hex-encoded
    pub activation_string: String,
    pub created: i64,
    pub valid_until: i64,
}

// =============================================================================
// Notifications
// =============================================================================

/// Scheduled notification.
///
/// Eligible for delivery while `now > send_after` and
/// `times_tried < MAX_DELIVERY_ATTEMPTS`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    /// Shared by every notification created in the same series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    pub creation_time: i64,
    pub send_after: i64,
    pub times_tried: u32,
    pub user_id: String,
    pub title: String,
    pub body: String,
}

/// Notification contents before an id and creation time are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: String,
    pub send_after: i64,
    pub title: String,
    pub body: String,
}

// =============================================================================
// API Requests / Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivateUserRequest {
    /// Secret from the activation link, 64 hex characters
    pub activation_string: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnclaveUrlResponse {
    pub enclave_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddWalletRequest {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChallengeResponse {
    /// Nonce to sign with `personal_sign`
    pub challenge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyWalletRequest {
    pub address: String,
    /// 65-byte `r || s || v` signature, hex-encoded
    pub signature: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddContactRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactsResponse {
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleNotificationRequest {
    /// Unix seconds; the notification is sent after this moment
    pub send_after: i64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleSeriesRequest {
    pub notifications: Vec<ScheduleNotificationRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationCreated {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeriesCreated {
    pub series_id: String,
}

// =============================================================================
// Validation Helpers
// =============================================================================

/// `0x` followed by exactly 40 hex characters.
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Lowercased form used for every address comparison and lookup.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Minimal shape check: one `@`, non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
