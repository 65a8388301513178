//! Unified error types.
//!
//! Two families live here. [`Error`] covers infrastructure and lifecycle
//! failures: binding a port, reading configuration, a service refusing to
//! start. [`HttpError`] is what a route handler fails with; the route
//! pipeline turns it into a status line and a plain-text body and never lets
//! it escape further.

use std::fmt;

use http::StatusCode;

/// Boxed error accepted from service hooks and health probes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by berth's fallible setup and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A required configuration key was not set.
    #[error("config parameter ({key}) was not set")]
    ConfigMissing { key: String },

    #[error("config parameter ({key}) has an invalid value `{value}`")]
    InvalidConfig { key: String, value: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS key/cert were configured, but TLS is terminated upstream.
    #[error("TLS key/cert configured ({key_file}, {cert_file}) but TLS termination belongs to the fronting proxy")]
    TlsUnsupported { key_file: String, cert_file: String },

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    /// The service's start hook returned `false` or failed.
    #[error("startup failed: {0}")]
    StartupFailure(String),
}

// ── HttpError ────────────────────────────────────────────────────────────────

/// A handler failure: a status code plus a message sent as `text/plain`.
///
/// ```rust
/// use berth::HttpError;
///
/// async fn lookup(id: &str) -> Result<String, HttpError> {
///     if id.is_empty() {
///         return Err(HttpError::bad_request("id must not be empty"));
///     }
///     Err(HttpError::not_found(format!("no user {id}")))
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub const UNKNOWN_MESSAGE: &'static str = "Unknown error occurred";

    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    /// `400 Bad Request`. Schema validation failures use this.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// `503` with the generic message, for failures that carry no status.
    pub fn unknown() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, Self::UNKNOWN_MESSAGE)
    }

    /// Wraps an arbitrary error. The source is logged here and never sent
    /// to the client.
    pub fn from_error(err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "unrecognised handler error");
        Self::unknown()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {}
