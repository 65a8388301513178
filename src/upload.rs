//! Single-file multipart uploads.
//!
//! An upload route takes one file from a named `multipart/form-data` field,
//! writes it to a fresh file in the route's destination directory and hands
//! the handler an [`Upload`] describing it. The file stays where it was
//! written; moving or deleting it is up to the handler.
//!
//! | Failure | Response |
//! |---|---|
//! | not `multipart/form-data` | `400` |
//! | field missing, or a part under another name | `400` |
//! | file larger than the route's limit | `413` |
//! | destination not writable | `500` |

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::StatusCode;
use multer::{Constraints, Field, Multipart, SizeLimit};
use tokio::fs::File;
use tokio::io::AsyncWriteExt as _;

use crate::error::HttpError;

/// Upload size limit unless the route sets one: 4 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// A file received by an upload route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    /// The form field the file arrived under.
    pub field: String,
    /// The client's name for the file, if it sent one.
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    /// Where the file was written.
    pub path: PathBuf,
    pub size: u64,
}

/// The field an upload route reads, its size limit and where files go.
#[derive(Clone, Debug)]
pub(crate) struct FileField {
    pub(crate) name: String,
    pub(crate) max_size: u64,
    pub(crate) destination: PathBuf,
}

impl FileField {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            max_size: DEFAULT_MAX_FILE_SIZE,
            destination: std::env::temp_dir(),
        }
    }

    /// Parses `body` and writes the first file part under this field to disk.
    pub(crate) async fn receive(&self, content_type: Option<&str>, body: Bytes) -> Result<Upload, HttpError> {
        let boundary = content_type
            .and_then(|ct| multer::parse_boundary(ct).ok())
            .ok_or_else(|| HttpError::bad_request("Expected a multipart/form-data body"))?;

        let constraints = Constraints::new()
            .allowed_fields(vec![self.name.clone()])
            .size_limit(SizeLimit::new().per_field(self.max_size));
        let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(body) });
        let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

        let field = loop {
            match multipart.next_field().await.map_err(rejected)? {
                Some(field) if field.file_name().is_some() => break field,
                // A plain text part under the file's name.
                Some(_) => continue,
                None => return Err(HttpError::bad_request(format!("Missing file field '{}'", self.name))),
            }
        };

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(ToString::to_string);
        let path = self.destination.join(unique_name());

        let mut file = File::create_new(&path).await.map_err(|e| unwritable(&path, &e))?;
        let size = match copy(field, &mut file, &path).await {
            Ok(size) => size,
            Err(err) => {
                drop(file);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::debug!(path = %path.display(), error = %e, "could not remove partial upload");
                }
                return Err(err);
            }
        };

        tracing::debug!(field = %self.name, path = %path.display(), size, "file received");
        Ok(Upload { field: self.name.clone(), file_name, content_type, path, size })
    }
}

async fn copy(mut field: Field<'_>, file: &mut File, path: &Path) -> Result<u64, HttpError> {
    let mut size = 0;
    while let Some(chunk) = field.chunk().await.map_err(rejected)? {
        size += chunk.len() as u64;
        file.write_all(&chunk).await.map_err(|e| unwritable(path, &e))?;
    }
    file.flush().await.map_err(|e| unwritable(path, &e))?;
    Ok(size)
}

fn rejected(err: multer::Error) -> HttpError {
    match err {
        multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. } => {
            HttpError::new(StatusCode::PAYLOAD_TOO_LARGE, "File too large")
        }
        multer::Error::UnknownField { field_name } => {
            HttpError::bad_request(format!("Unexpected field '{}'", field_name.unwrap_or_default()))
        }
        err => HttpError::bad_request(format!("Invalid multipart body: {err}")),
    }
}

fn unwritable(path: &Path, err: &std::io::Error) -> HttpError {
    tracing::error!(path = %path.display(), error = %err, "cannot write upload");
    HttpError::internal("Could not store upload")
}

fn unique_name() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
    format!("berth-{}-{nanos:x}-{}", std::process::id(), NEXT.fetch_add(1, Ordering::Relaxed))
}
