// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{ChallengeRequest, ChallengeResponse, VerifyWalletRequest, Wallet},
    state::AppState,
    storage::TxHandle,
    wallet,
};

#[utoipa::path(
    post,
    path = "/wallets/challenge",
    request_body = ChallengeRequest,
    tag = "Wallets",
    security(("bearer" = [])),
    responses(
        (status = 200, body = ChallengeResponse),
        (status = 400, description = "Invalid address"),
        (status = 401, description = "Invalid session"),
        (status = 409, description = "Address already registered")
    )
)]
pub async fn request_challenge(
    State(state): State<AppState>,
    _auth: Auth,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let challenge =
        wallet::initialize(&state.challenges, &state.transactions, &request.address).await?;
    Ok(Json(ChallengeResponse { challenge }))
}

#[utoipa::path(
    post,
    path = "/wallets/verify",
    request_body = VerifyWalletRequest,
    tag = "Wallets",
    security(("bearer" = [])),
    responses(
        (status = 201, body = Wallet),
        (status = 400, description = "Invalid address or name"),
        (status = 401, description = "Invalid session, missing challenge or bad signature"),
        (status = 409, description = "Address or name already registered")
    )
)]
pub async fn verify_wallet(
    State(state): State<AppState>,
    auth: Auth,
    tx: TxHandle,
    Json(request): Json<VerifyWalletRequest>,
) -> Result<(StatusCode, Json<Wallet>), ApiError> {
    let wallet = wallet::finalize(
        &state.challenges,
        &tx,
        auth.identity.user_id(),
        &request.address,
        &request.signature,
        &request.name,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}
