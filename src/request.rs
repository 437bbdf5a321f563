//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;

use crate::error::BoxError;

/// Type-erased request body. Hyper's `Incoming` in production, anything that
/// implements `http_body::Body` in tests.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// An incoming HTTP request: head, path parameters, and a body that can be
/// taken exactly once.
///
/// The body is behind a `Mutex` to keep `Request: Sync`. It is only taken
/// through `&mut self`, so the lock is never contended.
#[derive(Debug)]
pub struct Request {
    parts: Parts,
    body: Mutex<Option<Body>>,
    params: HashMap<String, String>,
}

impl Request {
    /// Wraps any `http::Request` whose body yields [`Bytes`].
    pub fn new<B>(req: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self {
            parts,
            body: Mutex::new(Some(body.map_err(Into::into).boxed_unsync())),
            params: HashMap::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }

    /// Header lookup; names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{email}`, `req.param("email")` on `/users/a@b.c`
    /// returns `Some("a@b.c")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Takes the body out of the request. `None` once it has been taken.
    pub(crate) fn take_body(&mut self) -> Option<Body> {
        self.body.get_mut().unwrap_or_else(PoisonError::into_inner).take()
    }
}
