//! Unified infrastructure error type.

use std::net::SocketAddr;
use std::time::Duration;

/// Boxed, thread-safe error used for causes we do not own the type of
/// (body read failures, hyper errors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by scopehouse's fallible operations.
///
/// Request-level problems (a bad body, a missing record) are expressed as
/// [`ApiError`](crate::ApiError) responses, not as `Error`s. This type covers
/// what is fatal to a response or to the whole process: binding the
/// listener, draining it, serializing a payload, loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("shutdown did not complete within the {0:?} grace window")]
    ShutdownTimeout(Duration),

    #[error("shutdown failed: {0}")]
    Shutdown(String),

    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("invalid configuration value for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(key: &str, reason: impl Into<String>) -> Self {
        Self::Config { key: key.to_owned(), reason: reason.into() }
    }
}
