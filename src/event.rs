//! Per-request context.
//!
//! A [`RequestEvent`] is created for every inbound request and owned by the
//! task handling it. It bundles the request, the application and the
//! decode/respond API handlers use:
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use scopehouse::{ApiError, RequestEvent, Response};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Rename { name: String }
//!
//! async fn rename(mut ev: RequestEvent) -> Result<Response, ApiError> {
//!     let body: Rename = ev.decode(None).await?;
//!     Ok(ev.respond_text(StatusCode::OK, &body.name))
//! }
//! ```

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api_error::ApiError;
use crate::app::App;
use crate::decode::{self, DecodeError, UnmarshalError, UnmarshalOptions};
use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::writer;

pub struct RequestEvent {
    request: Request,
    app: Arc<dyn App>,
}

impl RequestEvent {
    pub fn new(request: Request, app: Arc<dyn App>) -> Self {
        Self { request, app }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn app(&self) -> &Arc<dyn App> {
        &self.app
    }

    /// Decodes the body as exactly one JSON value.
    ///
    /// `None` uses [`UnmarshalOptions::default`]. The body can be decoded
    /// once; a second call is a server error. On error nothing is returned,
    /// so there is no partially-filled destination to misuse.
    pub async fn decode<T>(&mut self, options: Option<UnmarshalOptions>) -> Result<T, UnmarshalError>
    where
        T: DeserializeOwned,
    {
        let options = options.unwrap_or_default();
        let limit = options.limit();
        let result = match self.request.take_body() {
            Some(body) => decode::decode_body(body, &options).await,
            None => Err(DecodeError::BodyConsumed),
        };
        result.map_err(|e| decode::classify(e, limit))
    }

    /// See [`writer::write_json`].
    pub fn respond_json<T>(&self, value: &T, status: StatusCode) -> Result<Response, Error>
    where
        T: Serialize + ?Sized,
    {
        writer::write_json(value, status)
    }

    /// See [`writer::write_text`].
    pub fn respond_text(&self, status: StatusCode, message: &str) -> Response {
        writer::write_text(status, message)
    }

    /// See [`writer::write_status`].
    pub fn respond_status(&self, status: StatusCode) -> Response {
        writer::write_status(status)
    }

    /// A `500` JSON error. A blank message becomes the generic phrase.
    pub fn respond_internal_server_error(&self, message: &str) -> Response {
        ApiError::internal(message).into_response()
    }
}

impl std::fmt::Debug for RequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEvent").field("request", &self.request).finish_non_exhaustive()
    }
}

/// Client faults become a `400` carrying the classifier's message. Server
/// faults are logged with their cause and become the generic `500`.
impl From<UnmarshalError> for ApiError {
    fn from(err: UnmarshalError) -> Self {
        if err.is_client_error() {
            return ApiError::bad_request(err.message());
        }
        tracing::error!(error = %err.cause(), "request body decode failed");
        ApiError::internal("")
    }
}
