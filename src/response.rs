//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Handlers build one [`Response`] and return it. Most of the time you will
//! not construct it by hand: the [`writer`](crate::writer) functions and the
//! `respond_*` methods on [`RequestEvent`](crate::RequestEvent) do it for you.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values the runtime writes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,  // application/json
    Text,  // text/plain; charset=utf-8
}

impl ContentType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use scopehouse::{ContentType, Response};
///
/// let res = Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .body(ContentType::Json, br#"{"id":42}"#.to_vec());
///
/// assert_eq!(res.status_code(), StatusCode::CREATED);
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The `content-type` header, if set and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn into_hyper(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Terminated by a
/// typed body method, so the content type is always set alongside the bytes.
#[derive(Debug)]
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Adds a header. Invalid names or values are dropped with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            _ => tracing::warn!(header = name, "dropping invalid response header"),
        }
        self
    }

    /// Terminate with a typed body. The content type replaces any
    /// `content-type` header added earlier.
    pub fn body(mut self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Response { status: self.status, headers: self.headers, body: body.into() }
    }

    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Anything a handler returns must implement this. `Result<R, E>` works when
/// both sides do, which is what makes `?` on an
/// [`UnmarshalError`](crate::UnmarshalError) or [`ApiError`](crate::ApiError)
/// inside a handler produce the right error response.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { crate::writer::write_text(StatusCode::OK, self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { crate::writer::write_text(StatusCode::OK, &self) }
}

/// Return a bare status from a handler; the body is its reason phrase.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { crate::writer::write_status(self) }
}

impl<R, E> IntoResponse for Result<R, E>
where
    R: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Response {
        match self {
            Ok(r) => r.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

/// Infrastructure failures inside a handler (a payload that would not
/// serialize, say) are logged in full and answered with the generic 500.
impl IntoResponse for crate::Error {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        crate::ApiError::internal("").into_response()
    }
}
