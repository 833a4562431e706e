use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use archiiv_store::{ErrorKind, StoreError};
use archiiv_types::{Capability, RecordId, TypeError};

use crate::response::Envelope;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("token rejected: {0}")]
    Token(#[from] archiiv_crypto::TokenError),

    #[error("{user} lacks {capability} on {id}")]
    Forbidden {
        user: String,
        capability: Capability,
        id: RecordId,
    },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid name: {0}")]
    InvalidName(#[from] TypeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("user store error: {0}")]
    Users(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthFailed(_) | Self::Token(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::InvalidName(_) => StatusCode::BAD_REQUEST,
            Self::UserExists(_) => StatusCode::CONFLICT,
            Self::UnknownUser(_) => StatusCode::NOT_FOUND,
            Self::Store(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InvalidName => StatusCode::BAD_REQUEST,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::CorruptStore | ErrorKind::Io | ErrorKind::InvariantViolation => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Users(_) | Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message sent to the client. Server-side failures are logged in
    /// full and reported only by status.
    fn client_message(&self) -> String {
        if self.status().is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(Envelope::<()>::error(self.client_message()))).into_response()
    }
}
