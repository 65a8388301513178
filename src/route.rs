//! Route contracts.
//!
//! A [`Route`] binds a path and a handler to one of six request shapes. Every
//! shape runs the same pipeline, and any stage may end the request:
//!
//! ```text
//! authz ──► validate (create/update) ──► handler ──► map reply ──► response
//!   │       negotiate (read)               │
//!   401     400 / 406                      handler's status + message
//! ```
//!
//! | Route | Method | Success mapping |
//! |---|---|---|
//! | [`create`](Route::create) | POST | id string → 201 + `Location`; object/array → 200 JSON; else 204 |
//! | [`read`](Route::read) | GET | negotiated JSON (chunked when long) or XLSX attachment |
//! | [`simple_read`](Route::simple_read) | GET | value in the route's content type; long arrays chunked |
//! | [`update`](Route::update) | PUT | object/array → 200 JSON; else 204 |
//! | [`delete`](Route::delete) | DELETE | always 204 |
//! | [`fixed`](Route::fixed) | GET | precomputed JSON, no handler |
//! | [`upload`](Route::upload) | POST | value → 200 JSON; else 200 empty |
//!
//! Redirect and content replies are honoured on every route except delete.
//! Attachments are too, except that a read route only sends one to a client
//! that negotiated XLSX.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt as _;
use http::header::{CONTENT_DISPOSITION, LOCATION, SET_COOKIE};
use http::{Method, StatusCode};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::{Map, Value};

use crate::authz::Requirement;
use crate::chunked::{ChunkedArrayEmitter, frame_array};
use crate::error::HttpError;
use crate::handler::{BoxedHandler, Endpoint, Handler};
use crate::negotiate::{MediaType, negotiate};
use crate::reply::{Attachment, Content, Redirect, Reply};
use crate::request::{Context, CookieJar, Request};
use crate::response::{ContentType, Response};
use crate::router::Visibility;
use crate::schema::Schema;
use crate::upload::FileField;

/// Name of the path parameter holding the trailing identifier segment.
pub const ID_PARAM: &str = "id";

/// Bytes escaped when an id becomes a `Location` path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'%').add(b'/').add(b'<').add(b'>')
    .add(b'?').add(b'`').add(b'{').add(b'}');

/// The request shape a route implements.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Verb {
    Create,
    Read,
    SimpleRead,
    Update,
    Delete,
    Static,
    Upload,
}

impl Verb {
    pub fn method(self) -> Method {
        match self {
            Self::Create | Self::Upload             => Method::POST,
            Self::Read | Self::SimpleRead | Self::Static => Method::GET,
            Self::Update                            => Method::PUT,
            Self::Delete                            => Method::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create     => "create",
            Self::Read       => "read",
            Self::SimpleRead => "simple read",
            Self::Update     => "update",
            Self::Delete     => "delete",
            Self::Static     => "static",
            Self::Upload     => "upload",
        }
    }

    fn takes_body(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Action {
    Handler(BoxedHandler),
    Static(Bytes),
}

/// A route under construction. Immutable once registered.
///
/// ```rust
/// use berth::{Context, HttpError, Route, Visibility};
/// use berth::authz::Requirement;
/// use berth::schema::{Field, Schema};
///
/// async fn add_user(ctx: Context) -> Result<String, HttpError> {
///     let name = ctx.body()["name"].as_str().unwrap_or_default();
///     Ok(format!("{}-1", name))
/// }
///
/// let route = Route::create("/users/", add_user)
///     .schema(Schema::new().field("name", Field::string().required()))
///     .visibility(Visibility::Private)
///     .authz(Requirement::new().header("x-caller", ["billing"]));
/// assert_eq!(route.pattern(), "/users");
/// ```
pub struct Route {
    verb: Verb,
    path: String,
    id_segment: bool,
    visibility: Visibility,
    schema: Option<Schema>,
    authz: Option<Requirement>,
    content_type: ContentType,
    file: Option<FileField>,
    action: Action,
}

impl Route {
    fn new(verb: Verb, path: &str, id_segment: bool, action: Action) -> Self {
        Self {
            verb,
            path: normalize_path(path),
            id_segment,
            visibility: Visibility::Public,
            schema: None,
            authz: None,
            content_type: ContentType::Json,
            file: None,
            action,
        }
    }

    /// `POST path`. No identifier segment by default.
    pub fn create(path: &str, handler: impl Handler) -> Self {
        Self::new(Verb::Create, path, false, Action::Handler(handler.into_boxed_handler()))
    }

    /// `GET path/{id}` with content negotiation.
    pub fn read(path: &str, handler: impl Handler) -> Self {
        Self::new(Verb::Read, path, true, Action::Handler(handler.into_boxed_handler()))
    }

    /// `GET path/{id}` answering in a fixed content type (JSON unless set).
    pub fn simple_read(path: &str, handler: impl Handler) -> Self {
        Self::new(Verb::SimpleRead, path, true, Action::Handler(handler.into_boxed_handler()))
    }

    /// `PUT path/{id}`.
    pub fn update(path: &str, handler: impl Handler) -> Self {
        Self::new(Verb::Update, path, true, Action::Handler(handler.into_boxed_handler()))
    }

    /// `DELETE path/{id}`.
    pub fn delete(path: &str, handler: impl Handler) -> Self {
        Self::new(Verb::Delete, path, true, Action::Handler(handler.into_boxed_handler()))
    }

    /// `GET path` answering `body` at 200, serialised once up front.
    pub fn fixed(path: &str, body: &Value) -> Self {
        Self::new(Verb::Static, path, false, Action::Static(Bytes::from(body.to_string())))
    }

    /// `POST path` taking one file from the multipart field `field`. The
    /// handler finds it in [`Context::upload`]. Limited to
    /// [`DEFAULT_MAX_FILE_SIZE`](crate::DEFAULT_MAX_FILE_SIZE) and written to
    /// the system temp directory unless configured otherwise.
    pub fn upload(path: &str, field: &str, handler: impl Handler) -> Self {
        let mut route = Self::new(Verb::Upload, path, false, Action::Handler(handler.into_boxed_handler()));
        route.file = Some(FileField::new(field));
        route
    }

    /// Largest accepted upload in bytes. Upload routes only.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        if let Some(file) = &mut self.file {
            file.max_size = bytes;
        }
        self
    }

    /// Directory uploaded files are written to. Upload routes only.
    pub fn destination(mut self, dir: impl Into<PathBuf>) -> Self {
        if let Some(file) = &mut self.file {
            file.destination = dir.into();
        }
        self
    }

    /// Whether the path ends in an `{id}` segment. Ignored for fixed routes.
    pub fn with_id(mut self, id_segment: bool) -> Self {
        self.id_segment = id_segment && self.verb != Verb::Static;
        self
    }

    /// Validates request bodies. Only create and update routes read a body;
    /// elsewhere the schema is ignored.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Shorthand for `.visibility(Visibility::Private)`.
    pub fn private(self) -> Self {
        self.visibility(Visibility::Private)
    }

    pub fn authz(mut self, requirement: Requirement) -> Self {
        self.authz = Some(requirement);
        self
    }

    /// Content type for simple read routes.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn verb(&self) -> Verb { self.verb }
    pub fn path(&self) -> &str { &self.path }
    pub fn has_id(&self) -> bool { self.id_segment }
    pub fn get_visibility(&self) -> Visibility { self.visibility }

    /// The router pattern: the normalised path plus `/{id}` when present.
    pub fn pattern(&self) -> String {
        match (self.id_segment, self.path.as_str()) {
            (false, path) => path.to_owned(),
            (true, "/") => format!("/{{{ID_PARAM}}}"),
            (true, path) => format!("{path}/{{{ID_PARAM}}}"),
        }
    }

    pub(crate) fn into_endpoint(self, emitter: ChunkedArrayEmitter) -> Endpoint {
        if self.schema.is_some() && !self.verb.takes_body() {
            tracing::warn!(path = %self.path, verb = %self.verb, "schema ignored: route takes no body");
        }
        let pipeline = Arc::new(Pipeline { route: self, emitter });
        Arc::new(move |req| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move { pipeline.run(req).await })
        })
    }
}

/// Single leading slash, no trailing slash.
pub(crate) fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

struct Pipeline {
    route: Route,
    emitter: ChunkedArrayEmitter,
}

impl Pipeline {
    async fn run(&self, mut req: Request) -> Response {
        let route = &self.route;

        if let Some(requirement) = &route.authz {
            if !requirement.allow(req.headers()) {
                tracing::debug!(path = req.path(), "authorization headers rejected");
                return Response::status(StatusCode::UNAUTHORIZED);
            }
        }

        let handler = match &route.action {
            Action::Static(body) => return Response::json(body.clone()),
            Action::Handler(handler) => handler,
        };

        let body = if route.verb.takes_body() {
            match self.payload(req.body()) {
                Ok(body) => body,
                Err(err) => {
                    tracing::debug!(path = req.path(), error = %err.message, "request body rejected");
                    return failure(&err);
                }
            }
        } else {
            Value::Null
        };

        let upload = match &route.file {
            Some(file) => match file.receive(req.header("content-type"), req.body.clone()).await {
                Ok(upload) => Some(upload),
                Err(err) => {
                    tracing::debug!(path = req.path(), error = %err.message, "upload rejected");
                    return failure(&err);
                }
            },
            None => None,
        };

        let accepts = match route.verb {
            Verb::Read => match negotiate(req.header("accept")) {
                Some(media) => Some(media),
                None => return Response::status(StatusCode::NOT_ACCEPTABLE),
            },
            _ => None,
        };

        let jar = CookieJar::default();
        let params = std::mem::take(&mut req.params);
        let ctx = Context {
            body,
            id: if route.id_segment { params.get(ID_PARAM).cloned() } else { None },
            params,
            headers: req.headers().clone(),
            query: req.query(),
            accepts,
            upload,
            jar: jar.clone(),
        };

        let outcome = AssertUnwindSafe(async move { handler.call(ctx).await })
            .catch_unwind()
            .await;

        let mut response = match outcome {
            Ok(Ok(reply)) => self.map(reply, &req, accepts),
            Ok(Err(err)) => {
                if err.status.is_server_error() {
                    tracing::warn!(path = req.path(), status = err.status.as_u16(), error = %err.message, "handler failed");
                } else {
                    tracing::debug!(path = req.path(), status = err.status.as_u16(), error = %err.message, "handler refused request");
                }
                failure(&err)
            }
            Err(_) => {
                tracing::error!(path = req.path(), verb = %route.verb, "handler panicked");
                failure(&HttpError::unknown())
            }
        };

        for cookie in jar.drain() {
            response.append_header(SET_COOKIE, cookie);
        }
        response
    }

    /// Parses (and, with a schema, validates) a create/update body. An empty
    /// body reads as `{}`.
    fn payload(&self, raw: &[u8]) -> Result<Value, HttpError> {
        let body = if raw.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(raw).map_err(|e| {
                tracing::debug!(error = %e, "malformed JSON body");
                HttpError::bad_request("Invalid JSON body")
            })?
        };

        match (&self.route.schema, body) {
            (None, body) => Ok(body),
            (Some(schema), Value::Object(map)) => schema.validate(&map).map(Value::Object),
            (Some(_), _) => Err(HttpError::bad_request("Request body must be a JSON object")),
        }
    }

    fn map(&self, reply: Reply, req: &Request, accepts: Option<MediaType>) -> Response {
        let verb = self.route.verb;
        if verb == Verb::Delete {
            return Response::status(StatusCode::NO_CONTENT);
        }

        match reply {
            Reply::Redirect(redirect) => redirect_to(redirect),
            Reply::Content(content) => verbatim(content),
            Reply::Attachment(_) if verb == Verb::Read && accepts != Some(MediaType::Spreadsheet) => {
                Response::status(StatusCode::NOT_ACCEPTABLE)
            }
            Reply::Attachment(attachment) => attach(attachment),
            Reply::Empty if verb == Verb::Upload => Response::status(StatusCode::OK),
            Reply::Empty => Response::status(StatusCode::NO_CONTENT),
            Reply::Value(value) => match verb {
                Verb::Create => created(value, req),
                Verb::Update => compound_or_empty(value),
                Verb::Read => match accepts {
                    // The client asked only for a spreadsheet and the handler
                    // produced a plain value.
                    Some(MediaType::Spreadsheet) => Response::status(StatusCode::NOT_ACCEPTABLE),
                    _ => self.json(value),
                },
                Verb::SimpleRead => self.simple(value),
                Verb::Upload if value.is_null() => Response::status(StatusCode::OK),
                Verb::Upload => encode_json(&value),
                Verb::Delete | Verb::Static => Response::status(StatusCode::NO_CONTENT),
            },
        }
    }

    fn json(&self, value: Value) -> Response {
        match value {
            Value::Array(items) if self.emitter.should_chunk(items.len()) => self.emitter.respond(items),
            value => encode_json(&value),
        }
    }

    fn simple(&self, value: Value) -> Response {
        match (&self.route.content_type, value) {
            (_, Value::Array(items)) if self.emitter.should_chunk(items.len()) => {
                self.emitter.respond(items)
            }
            (ContentType::Json, value) => encode_json(&value),
            (content_type, Value::String(s)) => Response::builder().content_type(content_type).body(s),
            (content_type, value) => Response::builder().content_type(content_type).body(value.to_string()),
        }
    }
}

fn created(value: Value, req: &Request) -> Response {
    match value {
        Value::String(id) if !id.is_empty() => {
            let location = format!(
                "{}{}/{}",
                req.origin(),
                req.path().trim_end_matches('/'),
                utf8_percent_encode(&id, SEGMENT)
            );
            Response::builder()
                .status(StatusCode::CREATED)
                .header(LOCATION, &location)
                .no_body()
        }
        value => compound_or_empty(value),
    }
}

fn compound_or_empty(value: Value) -> Response {
    match value {
        Value::Object(_) | Value::Array(_) => encode_json(&value),
        _ => Response::status(StatusCode::NO_CONTENT),
    }
}

/// Arrays use the same framing as the chunked path so both are byte-identical.
fn encode_json(value: &Value) -> Response {
    let encoded = match value {
        Value::Array(items) => frame_array(items),
        other => serde_json::to_vec(other).map(Bytes::from),
    };
    match encoded {
        Ok(body) => Response::json(body),
        Err(e) => failure(&HttpError::internal(format!("failed to encode response: {e}"))),
    }
}

fn redirect_to(redirect: Redirect) -> Response {
    Response::builder()
        .status(redirect.status)
        .header(LOCATION, &redirect.location)
        .no_body()
}

fn verbatim(content: Content) -> Response {
    Response::builder()
        .content_type(&ContentType::Custom(content.content_type))
        .body(content.body)
}

fn attach(attachment: Attachment) -> Response {
    Response::builder()
        .content_type(&ContentType::Spreadsheet)
        .header(CONTENT_DISPOSITION, &format!("attachment; filename={}", attachment.filename))
        .body(attachment.body)
}

/// Status plus the message as plain text; no body when the message is empty.
fn failure(err: &HttpError) -> Response {
    if err.message.is_empty() {
        return Response::status(err.status);
    }
    Response::builder()
        .status(err.status)
        .content_type(&ContentType::Text)
        .body(err.message.clone())
}
