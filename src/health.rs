//! Health-check handler.
//!
//! `GET /api/v1/health` answers `200` with
//! `{"status":200,"message":"API is healthy."}` as long as the process can
//! serve HTTP at all. It has no dependencies, so it doubles as a Kubernetes
//! liveness probe:
//!
//! ```yaml
//! livenessProbe:
//!   httpGet:
//!     path: /api/v1/health
//!     port: 8090
//! ```

use http::StatusCode;
use serde::Serialize;
use tracing::info;

use crate::event::RequestEvent;
use crate::response::{IntoResponse, Response};

#[derive(Debug, Serialize)]
struct Health {
    status: u16,
    message: &'static str,
}

pub async fn health(ev: RequestEvent) -> Response {
    info!(url = %ev.request().uri(), "health called");

    let body = Health { status: StatusCode::OK.as_u16(), message: "API is healthy." };
    ev.respond_json(&body, StatusCode::OK).unwrap_or_else(IntoResponse::into_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::event;

    #[tokio::test]
    async fn reports_healthy() {
        let res = health(event("GET", "/api/v1/health", "")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.content_type(), Some("application/json"));
        assert_eq!(res.body(), b"{\"status\":200,\"message\":\"API is healthy.\"}\n");
    }
}
