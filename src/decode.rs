//! JSON request-body decoding and decode-error classification.
//!
//! The body is read frame by frame up to the byte limit. If the limit trips,
//! a syntax error in the bytes read so far still wins. Otherwise decoding
//! runs in three steps:
//!
//! 1. a syntax pass that scans exactly one top-level value,
//! 2. a typed pass over those bytes that tracks the failing field path and
//!    any keys the destination ignored,
//! 3. a trailing-content check, only once the typed pass succeeded.
//!
//! Any failure becomes a raw [`DecodeError`], which [`classify`] turns into
//! an [`UnmarshalError`]: a caller-safe message plus whether the caller or
//! the server is at fault. The rules are ordered; the first match wins.

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::error::Category;

use crate::error::BoxError;
use crate::request::Body;

/// Default request-body limit: 1 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1 << 20;

const INTERNAL_CONFIGURATION_ERROR: &str = "Internal configuration error.";
const SINGLE_OBJECT: &str = "Request body must contain a single json object.";

// ── Options ───────────────────────────────────────────────────────────────────

/// Per-call decode settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmarshalOptions {
    /// Body size limit in bytes. `0` means [`DEFAULT_MAX_BODY_BYTES`].
    pub max_body_bytes: usize,
    /// Reject keys the destination type does not declare.
    pub disallow_unknown_fields: bool,
}

impl Default for UnmarshalOptions {
    fn default() -> Self {
        Self { max_body_bytes: DEFAULT_MAX_BODY_BYTES, disallow_unknown_fields: false }
    }
}

impl UnmarshalOptions {
    pub(crate) fn limit(&self) -> usize {
        match self.max_body_bytes {
            0 => DEFAULT_MAX_BODY_BYTES,
            n => n,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Low-level reason a decode failed. Kept as the `source` of an
/// [`UnmarshalError`] for logging; never shown to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("request body has already been consumed")]
    BodyConsumed,

    #[error("failed to read request body: {0}")]
    Read(#[source] BoxError),

    #[error("request body is empty")]
    Empty,

    #[error("{error}")]
    Scan {
        #[source]
        error: serde_json::Error,
        offset: usize,
    },

    #[error("{error}")]
    Unmarshal {
        #[source]
        error: serde_json::Error,
        path: Option<String>,
        offset: usize,
    },

    #[error("unknown field {0}")]
    UnknownField(String),

    #[error("request body must contain a single json object")]
    TrailingContent,

    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// A failed decode, classified by fault.
///
/// `message` is safe to return to the caller. The underlying cause is only
/// reachable through [`std::error::Error::source`] for logging.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct UnmarshalError {
    message: String,
    client: bool,
    #[source]
    cause: DecodeError,
}

impl UnmarshalError {
    fn client(cause: DecodeError, message: impl Into<String>) -> Self {
        Self { message: message.into(), client: true, cause }
    }

    fn server(cause: DecodeError) -> Self {
        Self { message: INTERNAL_CONFIGURATION_ERROR.to_owned(), client: false, cause }
    }

    pub fn message(&self) -> &str { &self.message }

    /// `true` when the caller's input was at fault (a 4xx), `false` for a
    /// server-side defect (a 5xx).
    pub fn is_client_error(&self) -> bool { self.client }

    pub fn cause(&self) -> &DecodeError { &self.cause }
}

// ── Classification ────────────────────────────────────────────────────────────

/// Maps a raw decode failure to its caller-facing classification.
///
/// Order matters: a serde error can look like more than one class, and the
/// first rule that matches decides.
pub fn classify(err: DecodeError, max_body_bytes: usize) -> UnmarshalError {
    match &err {
        DecodeError::BodyConsumed => return UnmarshalError::server(err),
        DecodeError::TrailingContent => return UnmarshalError::client(err, SINGLE_OBJECT),
        _ => {}
    }

    // Malformed token.
    if let DecodeError::Scan { error, offset } = &err {
        if error.classify() == Category::Syntax {
            let msg = format!("Malformed json content at position {offset}.");
            return UnmarshalError::client(err, msg);
        }
    }

    // Input ended inside a value.
    if let DecodeError::Scan { error, .. } = &err {
        if error.classify() == Category::Eof {
            return UnmarshalError::client(err, "Malformed json content in request body.");
        }
    }

    // Value of the wrong type for its destination.
    if let DecodeError::Unmarshal { error, path, offset } = &err {
        if is_type_mismatch(error) {
            let msg = match path {
                Some(field) => format!("Invalid value type for field \"{field}\"."),
                None => format!("Invalid value type at character {offset}."),
            };
            return UnmarshalError::client(err, msg);
        }
    }

    if let DecodeError::Empty = err {
        return UnmarshalError::client(err, "Request body must not be empty.");
    }

    // Unknown key, rejected at runtime or by `deny_unknown_fields`.
    let unknown = match &err {
        DecodeError::UnknownField(field) => Some(field.clone()),
        DecodeError::Unmarshal { error, .. } => quoted_after(error, "unknown field "),
        _ => None,
    };
    if let Some(field) = unknown {
        return UnmarshalError::client(err, format!("Unknown field '{field}' in request body."));
    }

    if let DecodeError::Unmarshal { error, .. } = &err {
        if let Some(field) = quoted_after(error, "missing field ") {
            return UnmarshalError::client(err, format!("Missing required field \"{field}\"."));
        }
    }

    if let DecodeError::TooLarge { .. } = err {
        let msg = format!("Request body must not be larger than {max_body_bytes} bytes.");
        return UnmarshalError::client(err, msg);
    }

    UnmarshalError::server(err)
}

fn is_type_mismatch(error: &serde_json::Error) -> bool {
    if error.classify() != Category::Data {
        return false;
    }
    let msg = error.to_string();
    ["invalid type:", "invalid value:", "invalid length ", "unknown variant "]
        .iter()
        .any(|prefix| msg.starts_with(prefix))
}

/// Extracts the backtick-quoted name serde puts after `prefix`, as in
/// ``unknown field `extra`, expected ...``.
fn quoted_after(error: &serde_json::Error, prefix: &str) -> Option<String> {
    if error.classify() != Category::Data {
        return None;
    }
    let msg = error.to_string();
    let rest = msg.strip_prefix(prefix)?.strip_prefix('`')?;
    let end = rest.find('`')?;
    Some(rest[..end].to_owned())
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Reads at most `opts.limit()` bytes of `body` and decodes exactly one JSON
/// value.
pub(crate) async fn decode_body<T>(body: Body, opts: &UnmarshalOptions) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    let bytes = read_limited(body, opts.limit()).await?;
    decode_bytes(&bytes, opts.disallow_unknown_fields)
}

async fn read_limited(mut body: Body, limit: usize) -> Result<Bytes, DecodeError> {
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(DecodeError::Read)?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        let room = limit - buf.len();
        if data.len() > room {
            buf.extend_from_slice(&data[..room]);
            return Err(over_limit(&buf, limit));
        }
        buf.extend_from_slice(&data);
    }
    Ok(buf.freeze())
}

/// A syntax error in the bytes already read is reported ahead of the size
/// limit.
fn over_limit(read: &[u8], limit: usize) -> DecodeError {
    if let Err(DecodeError::Scan { error, offset }) = scan_first_value(read) {
        if error.classify() == Category::Syntax {
            return DecodeError::Scan { error, offset };
        }
    }
    DecodeError::TooLarge { limit }
}

fn decode_bytes<T>(bytes: &[u8], disallow_unknown_fields: bool) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    let end = scan_first_value(bytes)?;
    let value = bytes.get(..end).unwrap_or(bytes);

    let mut unknown: Option<String> = None;
    let result = {
        let mut de = serde_json::Deserializer::from_slice(value);
        let mut on_ignored = |path: serde_ignored::Path<'_>| {
            if unknown.is_none() {
                unknown = Some(path.to_string());
            }
        };
        let tracked = serde_ignored::Deserializer::new(&mut de, &mut on_ignored);
        serde_path_to_error::deserialize::<_, T>(tracked)
    };

    // An ignored key was seen before any typed failure, so it is reported
    // first.
    if disallow_unknown_fields {
        if let Some(field) = unknown {
            return Err(DecodeError::UnknownField(field));
        }
    }

    let value = result.map_err(|e| {
        let path = e.path().iter().next().map(|_| e.path().to_string());
        let error = e.into_inner();
        let offset = byte_offset(bytes, error.line(), error.column());
        DecodeError::Unmarshal { error, path, offset }
    })?;

    if bytes.get(end..).is_some_and(|rest| !rest.trim_ascii().is_empty()) {
        return Err(DecodeError::TrailingContent);
    }
    Ok(value)
}

/// Syntax-checks the first top-level value and returns where it ends.
fn scan_first_value(bytes: &[u8]) -> Result<usize, DecodeError> {
    let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<IgnoredAny>();
    match stream.next() {
        None => Err(DecodeError::Empty),
        Some(Ok(_)) => Ok(stream.byte_offset()),
        Some(Err(error)) => {
            let offset = byte_offset(bytes, error.line(), error.column());
            Err(DecodeError::Scan { error, offset })
        }
    }
}

/// Converts serde_json's 1-based line and column into the number of bytes
/// read when the error was raised.
fn byte_offset(bytes: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = bytes
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    (line_start + column).min(bytes.len())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fmt;

    use http_body_util::Full;
    use hyper::body::{Body as HttpBody, Frame, SizeHint};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize)]
    #[allow(dead_code)]
    struct Person {
        #[serde(default)]
        name: String,
        #[serde(default)]
        age: i32,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Required {
        email: String,
    }

    fn body(s: &str) -> Body {
        Full::new(Bytes::from(s.to_owned()))
            .map_err(|never| match never {})
            .boxed_unsync()
    }

    async fn decode<T: DeserializeOwned>(s: &str, opts: UnmarshalOptions) -> Result<T, UnmarshalError> {
        let limit = opts.limit();
        decode_body(body(s), &opts).await.map_err(|e| classify(e, limit))
    }

    async fn client_message<T: DeserializeOwned + fmt::Debug>(s: &str, opts: UnmarshalOptions) -> String {
        let err = decode::<T>(s, opts).await.unwrap_err();
        assert!(err.is_client_error(), "expected client error, got {err:?}");
        err.message().to_owned()
    }

    #[tokio::test]
    async fn decodes_single_object() {
        let p: Person = decode(r#"{"name":"test","age":1}"#, UnmarshalOptions::default()).await.unwrap();
        assert_eq!(p.name, "test");
        assert_eq!(p.age, 1);
    }

    #[tokio::test]
    async fn tolerates_trailing_whitespace() {
        let p: Person = decode("{\"name\":\"test\",\"age\":1}   \n", UnmarshalOptions::default()).await.unwrap();
        assert_eq!(p.age, 1);
    }

    #[tokio::test]
    async fn unknown_fields_allowed_by_default() {
        let p: Person =
            decode(r#"{"name":"test","address":"111 Main St."}"#, UnmarshalOptions::default()).await.unwrap();
        assert_eq!(p.name, "test");
        assert_eq!(p.age, 0);
    }

    #[tokio::test]
    async fn client_error_messages() {
        let d = UnmarshalOptions::default();
        let strict = UnmarshalOptions { disallow_unknown_fields: true, ..d };
        let small = UnmarshalOptions { max_body_bytes: 10, ..d };
        let large = format!(r#"{{"x":{}}}"#, "1".repeat(100));

        let cases: Vec<(&str, String, UnmarshalOptions, &str)> = vec![
            ("empty body", String::new(), d, "Request body must not be empty."),
            ("whitespace body", "  \n ".into(), d, "Request body must not be empty."),
            ("truncated object", "{".into(), d, "Malformed json content in request body."),
            ("truncated array", "[1, 2".into(), d, "Malformed json content in request body."),
            ("bad token", r#"{"name":!}"#.into(), d, "Malformed json content at position 9."),
            ("wrong type", r#"{"age":"not-a-number"}"#.into(), d, "Invalid value type for field \"age\"."),
            ("top-level type", r#""just a string""#.into(), d, "Invalid value type at character 15."),
            ("unknown field", r#"{"name":"test","extra":123}"#.into(), strict, "Unknown field 'extra' in request body."),
            ("multiple objects", "{}{}".into(), d, "Request body must contain a single json object."),
            ("too large", large, small, "Request body must not be larger than 10 bytes."),
        ];

        for (name, input, opts, want) in cases {
            let got = client_message::<Person>(&input, opts).await;
            assert_eq!(got, want, "case `{name}`");
        }
    }

    #[tokio::test]
    async fn syntax_error_before_the_limit_wins_over_size() {
        let small = UnmarshalOptions { max_body_bytes: 16, ..Default::default() };
        let input = format!("!{}", " ".repeat(64));
        let got = client_message::<Person>(&input, small).await;
        assert_eq!(got, "Malformed json content at position 1.");
    }

    #[tokio::test]
    async fn truncated_value_at_the_limit_is_too_large() {
        let small = UnmarshalOptions { max_body_bytes: 16, ..Default::default() };
        let input = format!(r#"{{"name":"{}"}}"#, "x".repeat(64));
        let got = client_message::<Person>(&input, small).await;
        assert_eq!(got, "Request body must not be larger than 16 bytes.");
    }

    #[tokio::test]
    async fn body_of_exactly_the_limit_is_accepted() {
        let input = r#"{"age":1}"#;
        let exact = UnmarshalOptions { max_body_bytes: input.len(), ..Default::default() };
        let p: Person = decode(input, exact).await.unwrap();
        assert_eq!(p.age, 1);
    }

    #[tokio::test]
    async fn syntax_error_wins_over_type_error() {
        let got = client_message::<Person>(r#"{"age":"x", !}"#, UnmarshalOptions::default()).await;
        assert!(got.starts_with("Malformed json content at position"), "{got}");
    }

    #[tokio::test]
    async fn type_error_wins_over_trailing_content() {
        let got = client_message::<Person>(r#"{"age":"x"}{}"#, UnmarshalOptions::default()).await;
        assert_eq!(got, "Invalid value type for field \"age\".");
    }

    #[tokio::test]
    async fn earlier_unknown_field_wins_over_type_error() {
        let strict = UnmarshalOptions { disallow_unknown_fields: true, ..Default::default() };
        let got = client_message::<Person>(r#"{"extra":1,"age":"x"}"#, strict).await;
        assert_eq!(got, "Unknown field 'extra' in request body.");
    }

    #[tokio::test]
    async fn missing_required_field() {
        let got = client_message::<Required>("{}", UnmarshalOptions::default()).await;
        assert_eq!(got, "Missing required field \"email\".");
    }

    #[tokio::test]
    async fn deny_unknown_fields_attribute_is_honoured() {
        #[derive(Debug, Deserialize)]
        #[serde(deny_unknown_fields)]
        #[allow(dead_code)]
        struct Strict {
            #[serde(default)]
            name: String,
        }

        let got = client_message::<Strict>(r#"{"nope":1}"#, UnmarshalOptions::default()).await;
        assert_eq!(got, "Unknown field 'nope' in request body.");
    }

    #[tokio::test]
    async fn nested_field_path_is_reported() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Outer {
            inner: Person,
        }

        let got = client_message::<Outer>(r#"{"inner":{"age":true}}"#, UnmarshalOptions::default()).await;
        assert_eq!(got, "Invalid value type for field \"inner.age\".");
    }

    #[tokio::test]
    async fn map_destination_accepts_anything_object_shaped() {
        let m: HashMap<String, serde_json::Value> =
            decode(r#"{"a":1,"b":[true]}"#, UnmarshalOptions::default()).await.unwrap();
        assert_eq!(m.len(), 2);
    }

    struct FailingBody;

    impl HttpBody for FailingBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            std::task::Poll::Ready(Some(Err(std::io::Error::other("test-error"))))
        }

        fn size_hint(&self) -> SizeHint {
            SizeHint::default()
        }
    }

    #[tokio::test]
    async fn unrecognized_read_failure_is_server_error() {
        let opts = UnmarshalOptions { max_body_bytes: 1024, ..Default::default() };
        let body = FailingBody.map_err(BoxError::from).boxed_unsync();
        let err = classify(
            decode_body::<HashMap<String, i32>>(body, &opts).await.unwrap_err(),
            1024,
        );
        assert!(!err.is_client_error());
        assert_eq!(err.message(), "Internal configuration error.");
        assert!(err.cause().to_string().contains("test-error"));
    }

    #[test]
    fn consumed_body_is_server_error() {
        let err = classify(DecodeError::BodyConsumed, DEFAULT_MAX_BODY_BYTES);
        assert!(!err.is_client_error());
        assert_eq!(err.message(), "Internal configuration error.");
    }

    #[test]
    fn zero_limit_falls_back_to_default() {
        let opts = UnmarshalOptions { max_body_bytes: 0, ..Default::default() };
        assert_eq!(opts.limit(), DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn offsets_count_previous_lines() {
        assert_eq!(byte_offset(b"{\n  !", 2, 3), 5);
        assert_eq!(byte_offset(b"abc", 1, 9), 3);
    }
}
