//! # scopehouse
//!
//! A minimal HTTP service runtime. Route a request, decode its JSON body
//! into a precise client/server error taxonomy, write a structured response,
//! and shut down on a signal within a bounded window.
//!
//! ## The contract
//!
//! - **Routing**: `matchit` radix trees, one per method; middleware composed
//!   once at startup, last registered outermost
//! - **Decoding**: one JSON value per body, size-limited; every failure is
//!   classified as the caller's fault (`400`, exact message) or ours (`500`,
//!   generic message, cause logged)
//! - **Responses**: JSON with a trailing newline, or plain text
//! - **Lifecycle**: `Idle → Listening → ShutdownRequested → Draining →
//!   Stopped`, or `Failed`; observable through [`Server::state`]
//!
//! The logger is an explicit value owned by the [`App`]; nothing installs a
//! process-wide subscriber.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use scopehouse::{
//!     ApiError, App, BaseApp, LogConfig, Logger, MemoryUserStore, RequestEvent, Response,
//!     Router, Server, ServerConfig,
//! };
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Greet { name: String }
//!
//! async fn greet(mut ev: RequestEvent) -> Result<Response, ApiError> {
//!     let body: Greet = ev.decode(None).await?;
//!     Ok(ev.respond_text(StatusCode::OK, &format!("hello {}", body.name)))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), scopehouse::Error> {
//!     let logger = Logger::new(&LogConfig::default());
//!     let app: Arc<dyn App> = Arc::new(BaseApp::new(logger, Arc::new(MemoryUserStore::new())));
//!     app.bootstrap()?;
//!
//!     let router = Router::new().register("POST /greet", greet);
//!     Server::new(ServerConfig::default()).serve(app, router).await
//! }
//! ```

mod api_error;
mod app;
mod config;
mod data;
mod decode;
mod error;
mod event;
mod handler;
mod logging;
mod request;
mod response;
mod router;
mod sentence;
mod server;
mod shutdown;
mod writer;

pub mod apis;
pub mod health;
pub mod middleware;

#[cfg(test)]
mod test_support;

pub use api_error::ApiError;
pub use config::{Config, ServerConfig};
pub use crate::app::{App, BaseApp};
pub use data::{DEFAULT_LOOKUP_DEADLINE, Lookup, MemoryUserStore, User, UserStore, WithDeadline};
pub use decode::{DEFAULT_MAX_BODY_BYTES, DecodeError, UnmarshalError, UnmarshalOptions, classify};
pub use error::{BoxError, Error};
pub use event::RequestEvent;
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use logging::{LogConfig, LogFormat, Logger};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Lifecycle, Server};
pub use shutdown::DEFAULT_GRACE_PERIOD;
pub use writer::{write_json, write_status, write_text};

pub use http::{Method, StatusCode};
