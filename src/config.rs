//! Process configuration.
//!
//! Read from `SH_*` environment variables, optionally seeded from a `.env`
//! file. Absent values take defaults; server timeouts below their floor are
//! replaced by [`ServerConfig::normalize`]. A value that is present but
//! cannot be parsed is an [`Error::Config`].
//!
//! | Variable | Default |
//! |---|---|
//! | `SH_SERVER_PORT` | `8090` |
//! | `SH_SERVER_IDLE_TIMEOUT` | `30s` (floor `10s`) |
//! | `SH_SERVER_READ_TIMEOUT` | `5s` (floor `1s`) |
//! | `SH_SERVER_WRITE_TIMEOUT` | `5s` (floor `1s`) |
//! | `SH_LOG_LEVEL` | `info` |
//! | `SH_LOG_FORMAT` | `text` |
//! | `SH_LOG_USE_SOURCE` | `true` |
//! | `SH_LOG_APP` | `scopehouse` |
//! | `SH_USERS_LOOKUP_TIMEOUT` | `3s` |

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::data::DEFAULT_LOOKUP_DEADLINE;
use crate::error::Error;
use crate::logging::{LogConfig, LogFormat};

pub const DEFAULT_PORT: u16 = 8090;
/// Used when `SH_SERVER_IDLE_TIMEOUT` is absent or below the 10 s floor.
/// There is no separate 10 s default ahead of the floor: an unset value
/// ends up at 30 s.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_READ_TIMEOUT: Duration = Duration::from_secs(1);
const MIN_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

// ── Server ────────────────────────────────────────────────────────────────────

/// Listener settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// How long a keep-alive connection may sit with no request in flight.
    pub idle_timeout: Duration,
    /// Bound on receiving a request head.
    pub read_timeout: Duration,
    /// Bound on producing a response once the head is read.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Replaces each value below its floor with its default.
    pub fn normalize(mut self) -> Self {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.idle_timeout < MIN_IDLE_TIMEOUT {
            self.idle_timeout = DEFAULT_IDLE_TIMEOUT;
        }
        if self.read_timeout < MIN_READ_TIMEOUT {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.write_timeout < MIN_WRITE_TIMEOUT {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        self
    }

    /// `0.0.0.0:{port}`.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

// ── Process ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
    /// Per-call deadline for user lookups.
    pub users_lookup_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log: LogConfig::default(),
            users_lookup_timeout: DEFAULT_LOOKUP_DEADLINE,
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let server = ServerConfig {
            port: parse_or(var("SH_SERVER_PORT"), "SH_SERVER_PORT", 0)?,
            idle_timeout: duration_or(var("SH_SERVER_IDLE_TIMEOUT"), "SH_SERVER_IDLE_TIMEOUT", Duration::ZERO)?,
            read_timeout: duration_or(var("SH_SERVER_READ_TIMEOUT"), "SH_SERVER_READ_TIMEOUT", Duration::ZERO)?,
            write_timeout: duration_or(var("SH_SERVER_WRITE_TIMEOUT"), "SH_SERVER_WRITE_TIMEOUT", Duration::ZERO)?,
        }
        .normalize();

        let log = LogConfig {
            level: var("SH_LOG_LEVEL").unwrap_or(defaults.log.level),
            format: match var("SH_LOG_FORMAT") {
                Some(v) => LogFormat::from_str(&v).map_err(|e| Error::config("SH_LOG_FORMAT", e))?,
                None => defaults.log.format,
            },
            use_source: match var("SH_LOG_USE_SOURCE") {
                Some(v) => parse_bool(&v).ok_or_else(|| Error::config("SH_LOG_USE_SOURCE", format!("`{v}` is not a boolean")))?,
                None => defaults.log.use_source,
            },
            app: var("SH_LOG_APP").unwrap_or(defaults.log.app),
        };

        let users_lookup_timeout = duration_or(
            var("SH_USERS_LOOKUP_TIMEOUT"),
            "SH_USERS_LOOKUP_TIMEOUT",
            defaults.users_lookup_timeout,
        )?;

        Ok(Self { server, log, users_lookup_timeout })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e| Error::config(key, format!("`{v}`: {e}"))),
        None => Ok(default),
    }
}

fn duration_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration, Error> {
    match value {
        Some(v) => parse_duration(&v).ok_or_else(|| Error::config(key, format!("`{v}` is not a duration"))),
        None => Ok(default),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses `300ms`, `5s`, `2m`, `1h`, compositions such as `1m30s`, or a bare
/// integer number of seconds.
pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let n: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit] {
            "ms" => Duration::from_millis(n),
            "s" => Duration::from_secs(n),
            "m" => Duration::from_secs(n.checked_mul(60)?),
            "h" => Duration::from_secs(n.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(part)?;
        rest = &rest[unit..];
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<Config, Error> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(from(&[]).unwrap(), Config::default());
    }

    #[test]
    fn values_below_floor_are_replaced() {
        let cfg = ServerConfig {
            port: 0,
            idle_timeout: Duration::from_secs(9),
            read_timeout: Duration::from_millis(999),
            write_timeout: Duration::ZERO,
        }
        .normalize();
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn unset_idle_timeout_is_thirty_seconds() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.server.idle_timeout, Duration::from_secs(30));
        assert_eq!(cfg.log.app, "scopehouse");
    }

    #[test]
    fn values_at_or_above_floor_are_kept() {
        let cfg = from(&[
            ("SH_SERVER_PORT", "9000"),
            ("SH_SERVER_IDLE_TIMEOUT", "10s"),
            ("SH_SERVER_READ_TIMEOUT", "1s"),
            ("SH_SERVER_WRITE_TIMEOUT", "1m30s"),
            ("SH_LOG_FORMAT", "json"),
            ("SH_LOG_USE_SOURCE", "false"),
            ("SH_LOG_APP", "billing"),
            ("SH_USERS_LOOKUP_TIMEOUT", "250ms"),
        ])
        .unwrap();

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.idle_timeout, Duration::from_secs(10));
        assert_eq!(cfg.server.read_timeout, Duration::from_secs(1));
        assert_eq!(cfg.server.write_timeout, Duration::from_secs(90));
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert!(!cfg.log.use_source);
        assert_eq!(cfg.log.app, "billing");
        assert_eq!(cfg.users_lookup_timeout, Duration::from_millis(250));
    }

    #[test]
    fn unparseable_values_name_the_key() {
        let err = from(&[("SH_SERVER_READ_TIMEOUT", "soon")]).unwrap_err();
        assert!(err.to_string().contains("SH_SERVER_READ_TIMEOUT"), "{err}");

        let err = from(&[("SH_SERVER_PORT", "70000")]).unwrap_err();
        assert!(err.to_string().contains("SH_SERVER_PORT"), "{err}");
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("1h2m3s"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_duration("5 s"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("3d"), None);
    }
}
