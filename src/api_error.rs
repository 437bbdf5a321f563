//! User-facing API errors.
//!
//! Every non-2xx response produced by a handler through this type has the
//! same wire shape:
//!
//! ```text
//! {"status":404,"message":"User not found."}
//! ```

use http::StatusCode;
use serde::Serialize;

use crate::response::{IntoResponse, Response};
use crate::sentence::format_sentence;
use crate::writer;

const INTERNAL_MESSAGE: &str = "Something went wrong while processing your request.";

/// A status code plus a sentence-formatted, caller-safe message.
///
/// Immutable once built. The message is never blank: an empty input falls
/// back to the status' reason phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: u16,
    message: String,
}

impl ApiError {
    /// Builds an error for `status`. Statuses outside 100–599 become 500.
    pub fn new(status: StatusCode, message: impl AsRef<str>) -> Self {
        let status = if (100..=599).contains(&status.as_u16()) {
            status
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let reason = status.canonical_reason().unwrap_or("");
        Self {
            status: status.as_u16(),
            message: format_sentence(message.as_ref(), reason),
        }
    }

    /// `400 Bad Request`.
    pub fn bad_request(message: impl AsRef<str>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// `404 Not Found`.
    pub fn not_found(message: impl AsRef<str>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// `500 Internal Server Error`, defaulting to a generic message.
    pub fn internal(message: impl AsRef<str>) -> Self {
        let message = match message.as_ref().trim() {
            "" => INTERNAL_MESSAGE,
            m => m,
        };
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match writer::write_json(&self, status) {
            Ok(res) => res,
            Err(e) => {
                tracing::error!(error = %e, "failed to write api error");
                writer::write_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
