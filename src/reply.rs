//! What a handler hands back.
//!
//! Handlers return `Result<impl Into<Reply>, HttpError>`. The `Ok` side is one
//! of the [`Reply`] variants; the route kind decides how each variant becomes
//! a status line, headers and body (see [`Route`](crate::Route)).
//!
//! ```rust
//! use berth::{Context, HttpError, Redirect, Reply};
//! use serde_json::json;
//!
//! async fn create(ctx: Context) -> Result<Reply, HttpError> {
//!     if ctx.query_param("legacy").is_some() {
//!         return Ok(Redirect::see_other("/v2/users").into());
//!     }
//!     Ok(json!("42").into()) // 201, Location: …/42
//! }
//! ```

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::HttpError;

#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// No value. Usually `204 No Content`.
    Empty,
    /// A plain value, serialised according to the route.
    Value(Value),
    Redirect(Redirect),
    /// Bytes written verbatim with the given content type.
    Content(Content),
    /// A spreadsheet download.
    Attachment(Attachment),
}

impl Reply {
    /// Serialises any `Serialize` value into [`Reply::Value`].
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        serde_json::to_value(value)
            .map(Self::Value)
            .map_err(|e| HttpError::internal(format!("failed to encode response: {e}")))
    }
}

/// A redirect to `location`, `302 Found` unless stated otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub status: StatusCode,
    pub location: String,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self::with_status(StatusCode::FOUND, location)
    }

    pub fn see_other(location: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SEE_OTHER, location)
    }

    pub fn permanent(location: impl Into<String>) -> Self {
        Self::with_status(StatusCode::MOVED_PERMANENTLY, location)
    }

    pub fn with_status(status: StatusCode, location: impl Into<String>) -> Self {
        Self { status, location: location.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Content {
    pub content_type: String,
    pub body: Bytes,
}

impl Content {
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self { content_type: content_type.into(), body: body.into() }
    }
}

/// Spreadsheet bytes plus the filename offered in `Content-Disposition`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub body: Bytes,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self { filename: filename.into(), body: body.into() }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<()> for Reply {
    fn from((): ()) -> Self { Self::Empty }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self { Self::Value(value) }
}

impl From<String> for Reply {
    fn from(s: String) -> Self { Self::Value(Value::String(s)) }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self { Self::Value(Value::String(s.to_owned())) }
}

impl From<Redirect> for Reply {
    fn from(r: Redirect) -> Self { Self::Redirect(r) }
}

impl From<Content> for Reply {
    fn from(c: Content) -> Self { Self::Content(c) }
}

impl From<Attachment> for Reply {
    fn from(a: Attachment) -> Self { Self::Attachment(a) }
}

/// `None` is [`Reply::Empty`].
impl<T: Into<Reply>> From<Option<T>> for Reply {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Empty, Into::into)
    }
}
