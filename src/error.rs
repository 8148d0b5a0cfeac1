//! Failure taxonomy for token handling, the gateway, login and startup.
//!
//! Gateway failures collapse into one uniform 403 at the HTTP boundary. Login
//! failures keep their distinction (401 vs 400 vs 500).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{models::ApiResponse, token::TokenKind};

/// Why a presented token was rejected. Kept distinct for operator logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid under both current and previous secrets")]
    SignatureInvalid,
    #[error("token has expired")]
    Expired,
    #[error("expected a {expected} token, got a {found} token")]
    KindMismatch { expected: TokenKind, found: TokenKind },
}

/// Why the gateway refused a request. Never sent to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("no X-APP-TOKEN header")]
    MissingToken,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("route {0} has no permission matrix entry")]
    MatrixMiss(String),
    #[error("route {route} requires role {required}")]
    RoleInsufficient { route: String, required: String },
}

impl IntoResponse for DenyReason {
    fn into_response(self) -> Response {
        // Every reason renders the same response.
        let body: ApiResponse<()> = ApiResponse::failure("Forbidden");
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

/// Login endpoint failures. These are distinguished for the caller.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("invalid credentials")]
    CredentialInvalid,
    #[error("invalid token: {0}")]
    Token(#[from] TokenError),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("unsupported grant type: {0}")]
    UnsupportedGrant(String),
    #[error("store error: {0}")]
    Repository(#[from] sqlx::Error),
}

impl LoginError {
    pub fn status(&self) -> StatusCode {
        match self {
            LoginError::CredentialInvalid | LoginError::Token(_) => StatusCode::UNAUTHORIZED,
            LoginError::MissingField(_)
            | LoginError::InvalidBody(_)
            | LoginError::UnsupportedGrant(_) => StatusCode::BAD_REQUEST,
            LoginError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Store details stay in the logs.
            LoginError::Repository(e) => {
                tracing::error!("login store error: {:?}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body: ApiResponse<()> = ApiResponse::failure(message);
        (status, Json(body)).into_response()
    }
}

/// Signing secret persistence failures. Rotation failures are retried on the next tick.
#[derive(Debug, Error)]
pub enum SaltError {
    #[error("failed to persist signing secrets: {0}")]
    Persist(#[from] sqlx::Error),
    #[error("signing secret record is missing")]
    Missing,
}

/// Raised when the permission matrix cannot be built. Fatal at startup.
#[derive(Debug, Error)]
#[error("failed to load permission matrix: {0}")]
pub struct MatrixLoadError(#[from] pub sqlx::Error);

impl IntoResponse for MatrixLoadError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        let body: ApiResponse<()> = ApiResponse::failure("Failed to load permission matrix");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: i64 },
    #[error(
        "JWT_SALT_LIFE_TIME ({rotation_minutes}m) must exceed the longest token lifetime ({max_token_minutes}m)"
    )]
    RotationTooShort {
        rotation_minutes: i64,
        max_token_minutes: i64,
    },
}
