//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in one table, and
//! middleware wraps handlers it knows nothing about. Both work through a
//! single trait object, [`ErasedHandler`]:
//!
//! ```text
//! async fn health(ev: RequestEvent) -> Response { … }  ← user writes this
//!        ↓ router.get("/api/v1/health", health)
//! health.into_boxed_handler()                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(health))                          ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(ev)  at request time                    ← one vtable dispatch
//!        ↓
//! Box::pin(async { health(ev).await.into_response() }) ← BoxFuture
//! ```
//!
//! Middleware produces new `BoxedHandler`s around existing ones, so a fully
//! composed stack is still one `Arc<dyn ErasedHandler>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::event::RequestEvent;
use crate::response::{IntoResponse, Response};

// ── Erased types ──────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Object-safe dispatch interface shared by route handlers and middleware.
pub trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, ev: RequestEvent) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any `async fn`
/// with the signature:
///
/// ```text
/// async fn name(ev: RequestEvent) -> impl IntoResponse
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, ev: RequestEvent) -> BoxFuture {
        let fut = (self.0)(ev);
        Box::pin(async move { fut.await.into_response() })
    }
}
