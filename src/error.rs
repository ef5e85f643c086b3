// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::enclave::EnclaveError;
use crate::mailer::MailError;
use crate::storage::{ScopeError, StoreError};
use crate::wallet::ChallengeError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::not_found(format!("{what} not found")),
            StoreError::Conflict(what) => Self::conflict(format!("{what} already exists")),
            other => {
                tracing::error!(error = %other, "Storage failure");
                Self::internal()
            }
        }
    }
}

impl From<ScopeError<ApiError>> for ApiError {
    fn from(e: ScopeError<ApiError>) -> Self {
        match e {
            ScopeError::Work(e) => e,
            other => {
                tracing::error!(error = %other, fatal = other.is_fatal(), "Transaction failed");
                Self::internal()
            }
        }
    }
}

impl From<ChallengeError> for ApiError {
    fn from(e: ChallengeError) -> Self {
        match e {
            ChallengeError::InvalidAddress | ChallengeError::InvalidName => {
                Self::bad_request(e.to_string())
            }
            ChallengeError::AlreadyRegistered => Self::conflict(e.to_string()),
            ChallengeError::NoChallenge | ChallengeError::InvalidSignature => {
                Self::unauthorized(e.to_string())
            }
            ChallengeError::Entropy(_) => {
                tracing::error!(error = %e, "Challenge could not be issued");
                Self::internal()
            }
            ChallengeError::Storage(store) => store.into(),
        }
    }
}

impl From<EnclaveError> for ApiError {
    fn from(e: EnclaveError) -> Self {
        tracing::error!(error = %e, "Enclave service failure");
        Self::new(StatusCode::BAD_GATEWAY, "Enclave service unavailable")
    }
}

impl From<MailError> for ApiError {
    fn from(e: MailError) -> Self {
        tracing::error!(error = %e, "Mail delivery failed");
        Self::internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        assert_eq!(ApiError::conflict("dup").status, StatusCode::CONFLICT);
        assert_eq!(ApiError::forbidden("no").status, StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::internal().status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[test]
    fn store_errors_map_to_status() {
        let nf: ApiError = StoreError::NotFound("User".into()).into();
        assert_eq!(nf.status, StatusCode::NOT_FOUND);

        let dup: ApiError = StoreError::Conflict("Wallet".into()).into();
        assert_eq!(dup.status, StatusCode::CONFLICT);

        let task: ApiError = StoreError::Task("join".into()).into();
        assert_eq!(task.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(task.message, "Internal server error");
    }

    #[test]
    fn challenge_errors_map_to_status() {
        let none: ApiError = ChallengeError::NoChallenge.into();
        assert_eq!(none.status, StatusCode::UNAUTHORIZED);
        assert_eq!(none.message, "no challenge requested");

        let sig: ApiError = ChallengeError::InvalidSignature.into();
        assert_eq!(sig.status, StatusCode::UNAUTHORIZED);

        let dup: ApiError = ChallengeError::AlreadyRegistered.into();
        assert_eq!(dup.status, StatusCode::CONFLICT);

        let bad: ApiError = ChallengeError::InvalidAddress.into();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    }
}
