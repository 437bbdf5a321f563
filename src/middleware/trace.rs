use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use super::Middleware;
use crate::event::RequestEvent;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};

/// Logs one record per request: method, path, status and latency.
///
/// Server errors (`5xx`) are logged at `error`, everything else at `info`.
pub fn trace() -> Trace {
    Trace
}

/// Middleware returned by [`trace()`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(TraceHandler { next })
    }
}

struct TraceHandler {
    next: BoxedHandler,
}

impl ErasedHandler for TraceHandler {
    fn call(&self, ev: RequestEvent) -> BoxFuture {
        let method = ev.request().method().clone();
        let path = ev.request().path().to_owned();
        let next = Arc::clone(&self.next);

        Box::pin(async move {
            let started = Instant::now();
            let res = next.call(ev).await;
            let status = res.status_code().as_u16();
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            if res.status_code().is_server_error() {
                error!(%method, %path, status, latency_ms, "request failed");
            } else {
                info!(%method, %path, status, latency_ms, "request served");
            }
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::handler::Handler;
    use crate::test_support::event;
    use crate::writer::write_status;

    #[tokio::test]
    async fn passes_the_response_through() {
        let inner = (|_ev: RequestEvent| async { write_status(StatusCode::BAD_GATEWAY) }).into_boxed_handler();
        let res = trace().wrap(inner).call(event("GET", "/x", "")).await;
        assert_eq!(res.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(res.body(), b"Bad Gateway");
    }
}
