//! Bounded capture of child output streams.

use std::io::ErrorKind;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK_BYTES: usize = 8_192;

/// Append-only byte buffer that stops growing at `limit` but keeps accepting
/// (and discarding) input so the writer never blocks on a full pipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl BoundedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let remaining = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > remaining {
            self.truncated = true;
        }
        let take = chunk.len().min(remaining);
        self.bytes.extend_from_slice(chunk.get(..take).unwrap_or_default());
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Mark the capture as incomplete without dropping anything, e.g. when the
    /// producer was killed mid-stream.
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lossy UTF-8 view. A multi-byte sequence cut at the limit becomes a
    /// single replacement character.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Buffer filled by a reader task and read by its owner, so bytes already
/// captured survive the task being aborted.
pub type SharedBuffer = Arc<Mutex<BoundedBuffer>>;

pub fn shared_buffer(limit: usize) -> SharedBuffer {
    Arc::new(Mutex::new(BoundedBuffer::new(limit)))
}

/// Drain `reader` to EOF into a [`BoundedBuffer`].
///
/// Read errors other than `Interrupted` end the capture; whatever was read
/// so far is kept.
pub async fn capture_stream<R>(reader: R, limit: usize) -> BoundedBuffer
where
    R: AsyncRead + Unpin,
{
    let sink = shared_buffer(limit);
    capture_into(reader, &sink).await;
    std::mem::take(&mut *sink.lock())
}

/// Drain `reader` to EOF, pushing each chunk into `sink` as it arrives.
pub async fn capture_into<R>(mut reader: R, sink: &Mutex<BoundedBuffer>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink.lock().push(chunk.get(..n).unwrap_or_default()),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::debug!(error = %err, "output stream closed with error");
                break;
            }
        }
    }
}
