//! Logger construction.
//!
//! There is no process-wide logger. [`Logger::new`] builds a
//! `tracing-subscriber` formatter and wraps it in a [`Dispatch`] that the
//! application owns and hands to the [`Server`](crate::Server), which runs
//! every task under it, inside a root span tagging records with the
//! application name. Code inside those tasks logs with the plain `tracing`
//! macros.

use std::str::FromStr;

use tracing::{Dispatch, Span};
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";
const DEFAULT_APP: &str = "scopehouse";

/// Output encoding of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`, expected `text` or `json`")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level or filter directive, e.g. `"info"` or `"scopehouse=debug"`.
    /// Invalid values fall back to `info`.
    pub level: String,
    pub format: LogFormat,
    /// Include file and line of the call site.
    pub use_source: bool,
    /// Value of the `app` field on every record.
    pub app: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_owned(),
            format: LogFormat::Text,
            use_source: true,
            app: DEFAULT_APP.to_owned(),
        }
    }
}

/// An explicitly constructed logger, threaded to whoever needs it.
#[derive(Debug, Clone)]
pub struct Logger {
    dispatch: Dispatch,
    app: String,
}

impl Logger {
    /// Builds a logger writing leveled, field-tagged records to stderr.
    pub fn new(config: &LogConfig) -> Self {
        let filter = EnvFilter::try_new(config.level.trim())
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_file(config.use_source)
            .with_line_number(config.use_source);

        let dispatch = match config.format {
            LogFormat::Json => Dispatch::new(builder.json().flatten_event(true).finish()),
            LogFormat::Text => Dispatch::new(builder.finish()),
        };
        Self { dispatch, app: config.app.clone() }
    }

    /// A logger that drops every record. Used by tests.
    pub fn discard() -> Self {
        Self { dispatch: Dispatch::none(), app: DEFAULT_APP.to_owned() }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// The root span every server task runs in, created on this logger.
    pub fn span(&self) -> Span {
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info_span!("app", app = %self.app)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" text ".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn invalid_level_still_builds() {
        let config = LogConfig { level: "not a level[".into(), ..LogConfig::default() };
        let logger = Logger::new(&config);
        tracing::dispatcher::with_default(logger.dispatch(), || {
            tracing::info!("still logging");
        });
    }

    #[test]
    fn root_span_carries_the_app_name() {
        let config = LogConfig { app: "billing".into(), ..LogConfig::default() };
        let span = Logger::new(&config).span();
        assert!(!span.is_disabled());
        assert_eq!(span.metadata().map(|m| m.name()), Some("app"));
        assert!(span.metadata().is_some_and(|m| m.fields().field("app").is_some()));
    }

    #[test]
    fn discard_is_silent() {
        let logger = Logger::discard();
        assert!(logger.dispatch().is::<tracing::subscriber::NoSubscriber>());
    }
}
