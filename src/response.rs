//! Outgoing HTTP response type.
//!
//! Route handlers do not build these; they return a [`Reply`](crate::Reply)
//! and the route pipeline maps it here. The type is public so that tests and
//! embedding code can inspect what a router produced.

use std::convert::Infallible;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt as _, Empty, Full, StreamBody};
use hyper::body::Frame;
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::ReceiverStream;

/// The body type berth hands to hyper.
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types a route can be configured to answer with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ContentType {
    #[default]
    Json,         // application/json; charset=utf-8
    Text,         // text/plain; charset=utf-8
    Spreadsheet,  // application/vnd.openxmlformats-officedocument.spreadsheetml.sheet
    Custom(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Json        => "application/json; charset=utf-8",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Spreadsheet => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Custom(ct)  => ct,
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

enum Body {
    Empty,
    Full(Bytes),
    Stream(mpsc::Receiver<Bytes>),
}

/// An outgoing HTTP response.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// `200 OK` with `application/json; charset=utf-8`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().content_type(&ContentType::Json).body(body)
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().content_type(&ContentType::Text).body(body.into())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Body::Empty }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { status: StatusCode::OK, headers: HeaderMap::new() }
    }

    /// `200 OK` JSON whose body arrives over `rx`, sent chunked.
    pub(crate) fn stream(rx: mpsc::Receiver<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        headers.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        Self { status: StatusCode::OK, headers, body: Body::Stream(rx) }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    pub(crate) fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Converts into the `http` type hyper serves.
    pub fn into_inner(self) -> http::Response<ResponseBody> {
        let body = match self.body {
            Body::Empty => Empty::new().boxed_unsync(),
            Body::Full(bytes) => Full::new(bytes).boxed_unsync(),
            Body::Stream(rx) => {
                let frames = ReceiverStream::new(rx).map(|chunk| Ok::<_, Infallible>(Frame::data(chunk)));
                StreamBody::new(frames).boxed_unsync()
            }
        };
        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Adds a header. A value that is not a legal header value is dropped
    /// with a warning rather than failing the response.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.append(name, v);
            }
            Err(_) => tracing::warn!(header = %name, "dropping invalid header value"),
        }
        self
    }

    pub fn content_type(self, content_type: &ContentType) -> Self {
        self.header(CONTENT_TYPE, content_type.as_str())
    }

    pub fn body(self, body: impl Into<Bytes>) -> Response {
        Response { status: self.status, headers: self.headers, body: Body::Full(body.into()) }
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Body::Empty }
    }
}
