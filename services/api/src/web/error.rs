//! services/api/src/web/error.rs
//!
//! The error type returned by page handlers. A failed access gate becomes a
//! bare redirect; everything else is a status code with a short message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use crm_core::ports::PortError;
use tracing::error;

#[derive(Debug)]
pub enum PageError {
    /// `303 See Other` to the given path, with no body.
    Redirect(String),
    Status(StatusCode, String),
}

impl PageError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        PageError::Status(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PageError::Status(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    /// Maps a port error to a response, logging unexpected failures.
    /// `context` is the user-facing message used for internal errors.
    pub fn from_port(e: PortError, context: &str) -> Self {
        match e {
            PortError::NotFound(what) => PageError::Status(StatusCode::NOT_FOUND, what),
            PortError::Conflict(what) => PageError::Status(StatusCode::CONFLICT, what),
            PortError::Unauthorized => {
                PageError::Status(StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            PortError::Unexpected(detail) => {
                error!("{}: {}", context, detail);
                PageError::internal(context)
            }
        }
    }
}

impl From<(StatusCode, String)> for PageError {
    fn from((status, message): (StatusCode, String)) -> Self {
        PageError::Status(status, message)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::Redirect(location) => Redirect::to(&location).into_response(),
            PageError::Status(status, message) => (status, message).into_response(),
        }
    }
}
