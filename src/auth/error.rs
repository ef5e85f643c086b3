// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every rejection reaches the client as the same 401 body so a caller cannot
//! tell an unknown subject from a bad signature. The variant is kept for logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StoreError;

/// Message returned for every rejected session.
pub const INVALID_SESSION: &str = "Invalid or malformed jwt";

#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Header shorter than `Bearer x` or without the `Bearer ` prefix
    InvalidAuthHeader,
    /// Token could not be decoded or lacks a subject
    MalformedToken,
    /// No account for the token subject
    UnknownSubject,
    /// Account has no usable verification key
    NoVerificationKey,
    /// Verification key could not be fetched from the enclave
    KeyUnavailable(String),
    /// Signature, issuer, audience, expiry or algorithm rejected
    InvalidToken(String),
    /// `iat` missing or in the future
    InvalidIssuedAt,
    /// Scope missing or not allowed on this route
    ScopeNotAllowed,
    /// The account store failed while resolving the subject
    Storage(StoreError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Storage(_) => "internal_error",
            _ => "invalid_session",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::UnknownSubject => write!(f, "Token subject does not exist"),
            AuthError::NoVerificationKey => write!(f, "Subject has no verification key"),
            AuthError::KeyUnavailable(msg) => write!(f, "Verification key unavailable: {msg}"),
            AuthError::InvalidToken(msg) => write!(f, "Token rejected: {msg}"),
            AuthError::InvalidIssuedAt => write!(f, "Token iat is missing or in the future"),
            AuthError::ScopeNotAllowed => write!(f, "Token scope is not allowed here"),
            AuthError::Storage(e) => write!(f, "Account lookup failed: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match &self {
            AuthError::Storage(_) => {
                tracing::error!(error = %self, "Authentication aborted");
                "Internal server error"
            }
            other => {
                tracing::debug!(reason = %other, "Session rejected");
                INVALID_SESSION
            }
        };
        let body = Json(AuthErrorBody {
            error: error.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(error: AuthError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unknown_subject_and_bad_signature_look_identical() {
        let unknown = body_of(AuthError::UnknownSubject).await;
        let bad_sig = body_of(AuthError::InvalidToken("InvalidSignature".into())).await;
        let transport = body_of(AuthError::KeyUnavailable("timeout".into())).await;

        assert_eq!(unknown.0, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, bad_sig);
        assert_eq!(unknown, transport);
        assert_eq!(unknown.1["error"], INVALID_SESSION);
        assert_eq!(unknown.1["error_code"], "invalid_session");
    }

    #[tokio::test]
    async fn storage_failure_is_500() {
        let (status, body) = body_of(AuthError::Storage(StoreError::Task("gone".into()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error_code"], "internal_error");
        assert!(!body["error"].as_str().unwrap().contains("gone"));
    }
}
