//! Middleware layer.
//!
//! A middleware is a handler decorator: it takes the handler built so far and
//! returns a new one around it. The [`Router`](crate::Router) applies them at
//! [`build`](crate::Router::build) time in registration order, each wrapping
//! the previous result, so the **last** one registered is the **outermost**:
//!
//! ```text
//! .middleware(a).middleware(b)
//!
//!   request → b → a → route dispatch → handler
//! ```
//!
//! Write one with [`from_fn`]:
//!
//! ```rust,no_run
//! use scopehouse::{Router, middleware};
//!
//! let router = Router::new().middleware(middleware::from_fn(|ev, next| async move {
//!     let mut res = next.run(ev).await;
//!     res.headers_mut().insert("x-served-by", "scopehouse".parse().unwrap());
//!     res
//! }));
//! ```
//!
//! Built-in:
//! - [`trace()`]: one log record per request with method, path, status, latency

mod trace;

use std::future::Future;
use std::sync::Arc;

pub use trace::{Trace, trace};

use crate::event::RequestEvent;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::response::{IntoResponse, Response};

/// A handler decorator.
pub trait Middleware: Send + Sync + 'static {
    /// Returns a handler that runs around `next`.
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// The rest of the chain beneath a [`from_fn`] middleware.
///
/// Consumed by [`run`](Next::run): the chain can be invoked at most once per
/// request. Not calling it short-circuits the request.
pub struct Next {
    inner: BoxedHandler,
}

impl Next {
    pub async fn run(self, ev: RequestEvent) -> Response {
        self.inner.call(ev).await
    }
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// Turns an async closure `(RequestEvent, Next) -> impl IntoResponse` into a
/// [`Middleware`].
pub fn from_fn<F, Fut, R>(f: F) -> FromFn<F>
where
    F: Fn(RequestEvent, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FromFn { f: Arc::new(f) }
}

/// Middleware returned by [`from_fn`].
pub struct FromFn<F> {
    f: Arc<F>,
}

impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(RequestEvent, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(FromFnHandler { f: Arc::clone(&self.f), next })
    }
}

struct FromFnHandler<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F, Fut, R> ErasedHandler for FromFnHandler<F>
where
    F: Fn(RequestEvent, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, ev: RequestEvent) -> BoxFuture {
        let fut = (self.f)(ev, Next { inner: Arc::clone(&self.next) });
        Box::pin(async move { fut.await.into_response() })
    }
}
