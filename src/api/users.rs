// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-up, activation and account lookup.
//!
//! Activation deploys the user's enclave and stores the key its sessions are
//! signed with. Until then the account cannot authenticate.
//!
//! Mail, deployer and enclave calls happen while no write transaction is
//! open. Handlers read from a snapshot, do their I/O, then write.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, warn};

use crate::{
    auth::{EnclaveOnly, UserOrEnclave},
    error::ApiError,
    mailer::{activation_body, activation_link, ACTIVATION_SUBJECT},
    models::{
        is_valid_address, is_valid_email, ActivateUserRequest, AddWalletRequest, Contact,
        CreateUserRequest, EnclaveUrlResponse, Signup, User, Wallet,
    },
    state::AppState,
    storage::{StoreError, TxHandle},
};

/// Lowercase letters in a generated user id.
const USER_ID_LEN: usize = 28;

const ACTIVATION_SECRET_BYTES: usize = 32;

/// Activation links stay valid for two weeks.
const ACTIVATION_VALIDITY_SECS: i64 = 336 * 60 * 60;

/// Minimum age of a link before a new one is sent.
const RESEND_COOLDOWN_SECS: i64 = 15 * 60;

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    tag = "Users",
    responses(
        (status = 201, description = "User created and activation link sent"),
        (status = 400, description = "Invalid name or email"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    tx: TxHandle,
    Json(request): Json<CreateUserRequest>,
) -> Result<StatusCode, ApiError> {
    let name = request.name.trim();
    let email = request.email.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if !is_valid_email(email) {
        return Err(ApiError::bad_request("invalid email"));
    }

    match state.transactions.snapshot()?.users().get_by_email(email) {
        Ok(_) => return Err(ApiError::conflict("user does already exist")),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let rng = SystemRandom::new();
    let user = User::new(random_user_id(&rng)?, name, email);
    let signup = new_signup(&rng, &user.id)?;

    // Nothing is stored if the link cannot be sent.
    send_activation_link(&state, &user, &signup).await?;

    let txn = tx.lock().await?;
    txn.users().create(&user).map_err(|e| match e {
        StoreError::Conflict(_) => ApiError::conflict("user does already exist"),
        other => other.into(),
    })?;
    txn.signups().create(&signup).map_err(|e| match e {
        StoreError::Conflict(_) => ApiError::conflict("user has already signed up"),
        other => other.into(),
    })?;

    info!(user_id = %user.id, "User signed up");
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    get,
    path = "/users/{email}/resend-activation-link",
    params(("email" = String, Path, description = "Account email")),
    tag = "Users",
    responses(
        (status = 201, description = "New activation link sent"),
        (status = 400, description = "Already activated, or the last link is too recent"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn resend_activation_link(
    State(state): State<AppState>,
    tx: TxHandle,
    Path(email): Path<String>,
) -> Result<StatusCode, ApiError> {
    let now = Utc::now().timestamp();
    let (user, previous) = {
        let snapshot = state.transactions.snapshot()?;
        let user = snapshot.users().get_by_email(&email).map_err(user_lookup)?;
        let signup = snapshot.signups().get(&user.id)?;
        (user, signup)
    };

    if previous.activated {
        return Err(ApiError::bad_request("user is already activated"));
    }
    if now < previous.created + RESEND_COOLDOWN_SECS {
        return Err(ApiError::bad_request(
            "please wait at least 15 minutes before requesting a new activation link",
        ));
    }

    let signup = new_signup(&SystemRandom::new(), &user.id)?;
    send_activation_link(&state, &user, &signup).await?;

    let txn = tx.lock().await?;
    txn.signups().update(&signup)?;

    info!(user_id = %user.id, "Activation link resent");
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/users/{email}/activate",
    params(("email" = String, Path, description = "Account email")),
    request_body = ActivateUserRequest,
    tag = "Users",
    responses(
        (status = 200, description = "Enclave deployed and bound to the account"),
        (status = 400, description = "Expired, invalid or already used activation link"),
        (status = 404, description = "Unknown user"),
        (status = 409, description = "An activation for this account is in progress"),
        (status = 502, description = "Enclave deployment failed")
    )
)]
pub async fn activate_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(request): Json<ActivateUserRequest>,
) -> Result<StatusCode, ApiError> {
    if request.activation_string.len() != ACTIVATION_SECRET_BYTES * 2
        || !request
            .activation_string
            .chars()
            .all(|c| c.is_ascii_hexdigit())
    {
        return Err(ApiError::bad_request("invalid activation link"));
    }

    // Held until the enclave is bound or removed.
    let _claim = state
        .activations
        .try_claim(&email.trim().to_lowercase())
        .ok_or_else(|| ApiError::conflict("activation is already in progress"))?;

    let now = Utc::now().timestamp();
    let (user, signup) = {
        let snapshot = state.transactions.snapshot()?;
        let user = snapshot.users().get_by_email(&email).map_err(user_lookup)?;
        let signup = snapshot.signups().get(&user.id)?;
        (user, signup)
    };

    if signup.activated {
        return Err(ApiError::bad_request("user is already activated"));
    }
    if signup.valid_until < now {
        return Err(ApiError::bad_request("activation link has expired"));
    }
    if !constant_time_eq(
        signup.activation_string.as_bytes(),
        request.activation_string.as_bytes(),
    ) {
        return Err(ApiError::bad_request("invalid activation link"));
    }

    let enclave_url = state.deployer.deploy_enclave(&user.id).await?;
    if let Err(e) = bind_enclave(&state, &user.id, &enclave_url).await {
        // Covers failures to fetch the key, to write, and to commit.
        if let Err(cleanup) = state.deployer.remove_enclave(&user.id).await {
            warn!(user_id = %user.id, error = %cleanup, "Failed to remove enclave after aborted activation");
        }
        return Err(e);
    }

    info!(user_id = %user.id, enclave_url = %enclave_url, "User activated");
    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/users/{email}",
    params(("email" = String, Path, description = "Account email")),
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = Contact),
        (status = 401, description = "Invalid session"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    _auth: UserOrEnclave,
    Path(email): Path<String>,
) -> Result<Json<Contact>, ApiError> {
    let user = state
        .transactions
        .snapshot()?
        .users()
        .get_by_email(&email)
        .map_err(user_lookup)?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    get,
    path = "/users/{email}/enclave-url",
    params(("email" = String, Path, description = "Account email")),
    tag = "Users",
    responses(
        (status = 200, body = EnclaveUrlResponse),
        (status = 400, description = "User not activated yet"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn get_enclave_url(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<EnclaveUrlResponse>, ApiError> {
    let user = state
        .transactions
        .snapshot()?
        .users()
        .get_by_email(&email)
        .map_err(user_lookup)?;
    if !user.is_activated() {
        return Err(ApiError::bad_request("user has not been verified yet"));
    }
    Ok(Json(EnclaveUrlResponse {
        enclave_url: user.enclave_url,
    }))
}

#[utoipa::path(
    post,
    path = "/users/{email}/wallets",
    params(("email" = String, Path, description = "Account email")),
    request_body = AddWalletRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Wallet registered"),
        (status = 400, description = "Invalid name or address"),
        (status = 401, description = "Invalid session, or not an enclave session"),
        (status = 403, description = "Account belongs to someone else"),
        (status = 409, description = "Address or name already registered")
    )
)]
/// Register a wallet the user's enclave generated. Wallets a user brings
/// must go through the challenge flow instead.
pub async fn add_wallet(
    auth: EnclaveOnly,
    tx: TxHandle,
    Path(email): Path<String>,
    Json(request): Json<AddWalletRequest>,
) -> Result<StatusCode, ApiError> {
    if !auth.identity.email().eq_ignore_ascii_case(email.trim()) {
        return Err(ApiError::forbidden("cannot modify another user"));
    }
    if request.name.is_empty() || !request.name.chars().all(char::is_alphanumeric) {
        return Err(ApiError::bad_request("wallet name must be alphanumeric"));
    }
    if !is_valid_address(&request.address) {
        return Err(ApiError::bad_request("invalid address"));
    }

    let wallet = Wallet {
        name: request.name,
        address: request.address,
    };
    let txn = tx.lock().await?;
    txn.users()
        .add_wallet(auth.identity.user_id(), &wallet)
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::conflict("target resource does already exist"),
            other => other.into(),
        })?;
    Ok(StatusCode::CREATED)
}

// =============================================================================
// Helpers
// =============================================================================

fn user_lookup(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => ApiError::not_found("user does not exist"),
        other => other.into(),
    }
}

/// Fetch the enclave's key, then mark the signup used and store the key in
/// one transaction of its own.
async fn bind_enclave(state: &AppState, user_id: &str, enclave_url: &str) -> Result<(), ApiError> {
    let key = state.enclaves.fetch_verification_key(enclave_url).await?;
    let (user_id, enclave_url) = (user_id.to_string(), enclave_url.to_string());
    state
        .transactions
        .run(|tx| async move {
            let txn = tx.lock().await?;
            let mut signup = txn.signups().get(&user_id)?;
            if signup.activated {
                return Err(ApiError::bad_request("user is already activated"));
            }
            signup.activated = true;
            txn.signups().update(&signup)?;
            txn.users().set_enclave(&user_id, &enclave_url, &key.to_hex())?;
            Ok(())
        })
        .await
        .map_err(ApiError::from)
}

async fn send_activation_link(
    state: &AppState,
    user: &User,
    signup: &Signup,
) -> Result<(), ApiError> {
    let link = activation_link(&state.frontend_url, &user.email, &signup.activation_string);
    state
        .mailer
        .send(&user.email, ACTIVATION_SUBJECT, &activation_body(&link))
        .await?;
    Ok(())
}

fn new_signup(rng: &SystemRandom, user_id: &str) -> Result<Signup, ApiError> {
    let mut secret = [0u8; ACTIVATION_SECRET_BYTES];
    rng.fill(&mut secret).map_err(|_| entropy_failure())?;

    let now = Utc::now().timestamp();
    Ok(Signup {
        user_id: user_id.to_string(),
        activated: false,
        activation_string: alloy::hex::encode(secret),
        created: now,
        valid_until: now + ACTIVATION_VALIDITY_SECS,
    })
}

/// Random id of lowercase ASCII letters.
fn random_user_id(rng: &SystemRandom) -> Result<String, ApiError> {
    // Largest multiple of 26 below 256; higher bytes are redrawn.
    const LIMIT: u8 = 234;

    let mut id = String::with_capacity(USER_ID_LEN);
    let mut buf = [0u8; USER_ID_LEN * 2];
    while id.len() < USER_ID_LEN {
        rng.fill(&mut buf).map_err(|_| entropy_failure())?;
        for byte in buf.iter().copied().filter(|b| *b < LIMIT) {
            if id.len() == USER_ID_LEN {
                break;
            }
            id.push(char::from(b'a' + byte % 26));
        }
    }
    Ok(id)
}

fn entropy_failure() -> ApiError {
    tracing::error!("System randomness unavailable");
    ApiError::internal()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_are_lowercase_letters() {
        let rng = SystemRandom::new();
        let a = random_user_id(&rng).unwrap();
        let b = random_user_id(&rng).unwrap();
        assert_eq!(a.len(), USER_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_lowercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn signup_secret_and_window() {
        let signup = new_signup(&SystemRandom::new(), "abc").unwrap();
        assert!(!signup.activated);
        assert_eq!(signup.activation_string.len(), 64);
        assert_eq!(signup.valid_until - signup.created, ACTIVATION_VALIDITY_SECS);
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq(b"abcd", b"abcd"));
        assert!(!constant_time_eq(b"abcd", b"abce"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
