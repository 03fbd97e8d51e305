//! Admission Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Reasons a connection request is refused before the upgrade.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// No token (or an empty one) in the query string.
    #[error("Missing admission token")]
    MissingToken,

    /// Token was never issued or has already been used.
    #[error("Invalid or already used admission token")]
    InvalidToken,
}

impl AdmissionError {
    /// HTTP status for this rejection.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MissingToken => StatusCode::BAD_REQUEST,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        // The protocol defines no error body; the status code is the signal.
        self.status().into_response()
    }
}
