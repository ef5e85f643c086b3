// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Bound on waiting for the database writer during a readiness check.
const STORE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of trying to open a database transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Ok,
    /// Another transaction held the writer for the whole check window.
    Busy,
    Unavailable,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub service: String,
    pub store: StoreStatus,
}

/// Readiness report: `status` is "ok" or "degraded".
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LiveResponse {
    pub status: String,
}

async fn check_store(state: &AppState) -> StoreStatus {
    let check = state.transactions.check_writer();
    match tokio::time::timeout(STORE_CHECK_TIMEOUT, check).await {
        Ok(Ok(())) => StoreStatus::Ok,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Readiness check could not open a transaction");
            StoreStatus::Unavailable
        }
        Err(_) => StoreStatus::Busy,
    }
}

/// The process is up. Nothing else is checked.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is running", body = LiveResponse))
)]
pub async fn liveness() -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "ok".to_string(),
    })
}

/// Ready once a database transaction can be opened and dropped.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Store reachable", body = ReadyResponse),
        (status = 503, description = "Store busy or unavailable", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let store = check_store(&state).await;
    let (code, status) = match store {
        StoreStatus::Ok => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    };

    let report = ReadyResponse {
        status: status.to_string(),
        checks: ReadinessChecks {
            service: "ok".to_string(),
            store,
        },
    };
    (code, Json(report))
}
