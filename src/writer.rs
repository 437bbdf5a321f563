//! Response writers: the lowest-level output primitives.
//!
//! Each function produces exactly one [`Response`] with its content type,
//! status and body already set. Nothing is produced on failure.

use http::StatusCode;
use serde::Serialize;

use crate::error::Error;
use crate::response::{ContentType, Response};

/// Serializes `value` as `application/json` with a single trailing newline.
///
/// Serialization failures are returned to the caller, never swallowed.
pub fn write_json<T>(value: &T, status: StatusCode) -> Result<Response, Error>
where
    T: Serialize + ?Sized,
{
    let mut body = serde_json::to_vec(value)?;
    body.push(b'\n');
    Ok(Response::builder().status(status).body(ContentType::Json, body))
}

/// Writes `message` verbatim as `text/plain; charset=utf-8`.
///
/// A blank message is replaced by the status' reason phrase.
pub fn write_text(status: StatusCode, message: &str) -> Response {
    let message = match message.trim() {
        "" => status.canonical_reason().unwrap_or_default(),
        m => m,
    };
    Response::builder()
        .status(status)
        .body(ContentType::Text, message.to_owned())
}

/// Writes the reason phrase for `status` as plain text.
pub fn write_status(status: StatusCode) -> Response {
    write_text(status, "")
}
