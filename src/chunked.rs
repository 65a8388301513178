//! Streaming of large JSON arrays.
//!
//! A handler that returns tens of thousands of rows should not serialise them
//! into one giant buffer, nor hold the executor while doing it. The emitter
//! writes the array in batches of `rows_per_chunk` items, handing each batch
//! to the response body and then yielding to the scheduler so other requests
//! get a turn.
//!
//! Framing is fixed and shared with the inline path ([`frame_array`]):
//!
//! ```text
//! [\n
//! {"id":1},\n
//! {"id":2}\n
//! ]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::response::Response;

pub const DEFAULT_MAX_ROWS_PER_CHUNK: usize = 1000;

// Batches in flight between the emitter task and the connection.
const CHANNEL_DEPTH: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("response stream closed by peer")]
    Closed,
    #[error("failed to encode array item: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Batching array writer. Cheap to copy; one lives on each router.
#[derive(Clone, Copy, Debug)]
pub struct ChunkedArrayEmitter {
    rows_per_chunk: usize,
}

impl Default for ChunkedArrayEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS_PER_CHUNK)
    }
}

impl ChunkedArrayEmitter {
    /// A zero batch size is treated as one.
    pub fn new(rows_per_chunk: usize) -> Self {
        Self { rows_per_chunk: rows_per_chunk.max(1) }
    }

    pub fn rows_per_chunk(&self) -> usize {
        self.rows_per_chunk
    }

    /// Arrays strictly longer than the batch size are streamed.
    pub fn should_chunk(&self, len: usize) -> bool {
        len > self.rows_per_chunk
    }

    /// Writes `items` as a framed JSON array into `sink`.
    ///
    /// Bytes are sent once per batch, followed by a yield; nothing else in the
    /// loop awaits. Returns [`EmitError::Closed`] if the receiver went away,
    /// which happens when the client disconnects mid-stream.
    pub async fn emit(&self, sink: &mpsc::Sender<Bytes>, items: &[Value]) -> Result<(), EmitError> {
        let mut buf = BytesMut::new();
        buf.put_slice(b"[\n");

        for (i, item) in items.iter().enumerate() {
            write_item(&mut buf, item, i + 1 == items.len())?;

            if (i + 1) % self.rows_per_chunk == 0 {
                sink.send(buf.split().freeze()).await.map_err(|_| EmitError::Closed)?;
                tokio::task::yield_now().await;
            }
        }

        buf.put_slice(b"]");
        sink.send(buf.freeze()).await.map_err(|_| EmitError::Closed)
    }

    /// Spawns [`emit`](Self::emit) and returns a `200` response streaming its
    /// output with `transfer-encoding: chunked`.
    pub(crate) fn respond(self, items: Vec<Value>) -> Response {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let total = items.len();

        tokio::spawn(async move {
            match self.emit(&tx, &items).await {
                Ok(()) => tracing::debug!(rows = total, "chunked array sent"),
                Err(EmitError::Closed) => tracing::debug!(rows = total, "client went away mid-stream"),
                Err(e) => tracing::error!(error = %e, "chunked array aborted"),
            }
        });

        Response::stream(rx)
    }
}

/// The whole array in one buffer, byte-identical to what
/// [`ChunkedArrayEmitter::emit`] produces.
pub fn frame_array(items: &[Value]) -> Result<Bytes, serde_json::Error> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"[\n");
    for (i, item) in items.iter().enumerate() {
        write_item(&mut buf, item, i + 1 == items.len())?;
    }
    buf.put_slice(b"]");
    Ok(buf.freeze())
}

fn write_item(buf: &mut BytesMut, item: &Value, last: bool) -> Result<(), serde_json::Error> {
    serde_json::to_writer((&mut *buf).writer(), item)?;
    buf.put_slice(if last { &b"\n"[..] } else { &b",\n"[..] });
    Ok(())
}
