use axum::{http::StatusCode, response::IntoResponse, Json};
use tracing::error;

use crate::auth::dto::AuthResponse;

/// Everything an identity flow can fail with. All variants are recovered at
/// the handler boundary into a `{success: false, message}` body; nothing
/// crosses into the transport layer as a panic.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email already registered")]
    EmailAlreadyExists,
    /// Covers both unknown email and wrong password so responses never reveal
    /// which one it was.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,
    #[error("External identity has no usable email")]
    InvalidExternalIdentity,
    #[error("User not found")]
    UserNotFound,
    #[error("{0}")]
    Validation(&'static str),
    /// Entropy source or KDF failure. Fatal environment problem, surfaced as
    /// a 5xx rather than disguised as a credential error.
    #[error("password hashing failed")]
    Hashing(#[source] anyhow::Error),
    #[error("identity provider exchange failed")]
    Provider(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailAlreadyExists => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AuthError::InvalidExternalIdentity => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Hashing(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// User-facing message. Server-side failures get a generic line; the real
    /// cause goes to the log only.
    fn message(&self) -> String {
        match self {
            AuthError::Hashing(_) | AuthError::Internal(_) => "Internal server error".into(),
            AuthError::Provider(_) => "Identity provider unavailable".into(),
            other => other.to_string(),
        }
    }
}

impl From<crate::users::StoreError> for AuthError {
    fn from(err: crate::users::StoreError) -> Self {
        match err {
            crate::users::StoreError::EmailExists => AuthError::EmailAlreadyExists,
            crate::users::StoreError::Other(e) => AuthError::Internal(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        if self.status().is_server_error() {
            error!(error = ?self, "identity flow failed");
        }
        let body = AuthResponse::failure(self.message());
        (self.status(), Json(body)).into_response()
    }
}
