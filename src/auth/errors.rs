//! Failures of the authentication decisions and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::repo::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please provide username or email")]
    MissingIdentifier,

    /// Shared by "no such user" and "wrong password".
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    DuplicateUser,

    #[error("Invalid user data: {0}")]
    InvalidUserData(String),

    #[error("An account with this email already signs in with a password")]
    FederatedEmailConflict,

    #[error("Credential store unavailable")]
    StoreUnavailable(#[source] StoreError),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingIdentifier
            | AuthError::DuplicateUser
            | AuthError::InvalidUserData(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::FederatedEmailConflict => StatusCode::CONFLICT,
            AuthError::StoreUnavailable(_) => StatusCode::BAD_GATEWAY,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Mapping for store failures on the write path.
impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => AuthError::DuplicateUser,
            StoreError::Invalid(reason) => AuthError::InvalidUserData(reason),
            e @ StoreError::Unavailable(_) => AuthError::StoreUnavailable(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
