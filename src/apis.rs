//! Service API routes.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /api/v1/health` | [`health`](crate::health::health) |
//! | `GET /api/v1/users/{email}` | [`get_user`] |
//! | `POST /api/v1/users/lookup` | [`lookup_user`] |

use http::StatusCode;
use serde::Deserialize;
use tracing::error;

use crate::api_error::ApiError;
use crate::data::Lookup;
use crate::decode::UnmarshalOptions;
use crate::event::RequestEvent;
use crate::health::health;
use crate::middleware;
use crate::response::Response;
use crate::router::Router;

/// Every service endpoint, wrapped in request tracing.
pub fn router() -> Router {
    Router::new()
        .register("GET /api/v1/health", health)
        .register("GET /api/v1/users/{email}", get_user)
        .register("POST /api/v1/users/lookup", lookup_user)
        .middleware(middleware::trace())
}

pub async fn get_user(ev: RequestEvent) -> Result<Response, ApiError> {
    let email = ev.request().param("email").unwrap_or_default().to_owned();
    find_user(&ev, &email).await
}

#[derive(Debug, Deserialize)]
struct LookupBody {
    email: String,
}

/// Same as [`get_user`], with the email in a `{"email": "..."}` body.
/// Fields other than `email` are rejected.
pub async fn lookup_user(mut ev: RequestEvent) -> Result<Response, ApiError> {
    let options = UnmarshalOptions { disallow_unknown_fields: true, ..UnmarshalOptions::default() };
    let body: LookupBody = ev.decode(Some(options)).await?;

    let email = body.email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("email must not be empty"));
    }
    find_user(&ev, email).await
}

async fn find_user(ev: &RequestEvent, email: &str) -> Result<Response, ApiError> {
    match ev.app().users().get_by_email(email).await {
        Lookup::Found(user) => ev.respond_json(&user, StatusCode::OK).map_err(|e| {
            error!(error = %e, "user response failed");
            ApiError::internal("")
        }),
        Lookup::NotFound => Err(ApiError::not_found("user not found")),
        Lookup::Failure(detail) => {
            error!(error = %detail, "user lookup failed");
            Err(ApiError::internal(""))
        }
    }
}
