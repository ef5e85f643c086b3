// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Elonwallet Backend - Enclave-Backed Wallet Account Service
//!
//! Private keys never reach this service. Each user gets an enclave, deployed
//! on activation, which signs the session tokens this service verifies.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum), one database transaction per request
//! - `auth` - Enclave-signed session verification
//! - `enclave` - Deployer and enclave HTTP clients
//! - `wallet` - EIP-191 wallet ownership challenges
//! - `notification_worker` - Background delivery of scheduled notifications
//! - `storage` - Embedded database (redb) and transaction scope

pub mod api;
pub mod auth;
pub mod config;
pub mod enclave;
pub mod error;
pub mod mailer;
pub mod models;
pub mod notification_worker;
pub mod state;
pub mod storage;
pub mod wallet;
