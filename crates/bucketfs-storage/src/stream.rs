//! Byte streams and range requests.

use crate::traits::{StorageError, StorageResult};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::TryStreamExt;
use std::fmt;

/// A stream of object content, as returned by `read` and accepted by `write`.
pub type ByteStream = BoxStream<'static, StorageResult<Bytes>>;

/// A byte range for partial reads, with HTTP semantics.
///
/// Both bounds are inclusive offsets. With only `start`, the read runs to the end of the
/// object. With only `end`, the read covers the last `end` bytes (a suffix range).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: Option<u64>, end: Option<u64>) -> StorageResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(StorageError::InvalidRange(format!(
                    "start {} is after end {}",
                    s, e
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// `start..=end`
    pub fn bounded(start: u64, end: u64) -> StorageResult<Self> {
        Self::new(Some(start), Some(end))
    }

    /// Everything from `start` to the end of the object.
    pub fn starting_at(start: u64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// The last `len` bytes of the object.
    pub fn suffix(len: u64) -> Self {
        Self {
            start: None,
            end: Some(len),
        }
    }

    /// The `Range` header value, e.g. `bytes=0-99`, `bytes=100-` or `bytes=-100`.
    pub fn header_value(&self) -> String {
        let start = self.start.map(|s| s.to_string()).unwrap_or_default();
        let end = self.end.map(|e| e.to_string()).unwrap_or_default();
        format!("bytes={}-{}", start, end)
    }

    /// Clamp to an object of `len` bytes, giving a half-open offset range.
    ///
    /// `None` when nothing of the object falls inside the range.
    pub fn to_offsets(&self, len: u64) -> Option<std::ops::Range<u64>> {
        let range = match (self.start, self.end) {
            (Some(start), Some(end)) => start..end.saturating_add(1).min(len),
            (Some(start), None) => start..len,
            (None, Some(suffix)) => len.saturating_sub(suffix)..len,
            (None, None) => 0..len,
        };
        (range.start < len && range.start < range.end).then_some(range)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// Wrap in-memory content as a single-chunk stream.
pub fn byte_stream(content: impl Into<Bytes>) -> ByteStream {
    let bytes: Bytes = content.into();
    Box::pin(stream::once(async move { Ok(bytes) }))
}

/// Drain a stream into one buffer.
pub async fn read_to_bytes(stream: ByteStream) -> StorageResult<Bytes> {
    let buffer = stream
        .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
            buffer.extend_from_slice(&chunk);
            Ok(buffer)
        })
        .await?;
    Ok(buffer.freeze())
}
