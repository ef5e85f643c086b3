// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One transaction per request.
//!
//! [`manage_transaction`] stores a [`TxHandle`] in the request extensions
//! before the handler runs. The write transaction behind it opens on the
//! handler's first [`TxHandle::lock`], so a request that only reads never
//! takes the writer. A response with a 4xx or 5xx status rolls the
//! transaction back; anything else commits it.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::{ScopeError, TxHandle};

pub async fn manage_transaction(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let outcome = state
        .transactions
        .run(|tx| async move {
            request.extensions_mut().insert(tx);
            let response = next.run(request).await;
            let status = response.status();
            if status.is_client_error() || status.is_server_error() {
                Err(response)
            } else {
                Ok(response)
            }
        })
        .await;

    match outcome {
        Ok(response) => response,
        Err(ScopeError::Work(response)) => response,
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Request transaction failed");
            ApiError::internal().into_response()
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for TxHandle {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<TxHandle>().cloned().ok_or_else(|| {
            error!("Route is not wrapped in a transaction");
            ApiError::internal()
        })
    }
}
