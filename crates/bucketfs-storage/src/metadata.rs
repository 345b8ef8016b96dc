//! Object metadata and its translation into a normalized stat record.

use crate::traits::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of a metadata query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Metadata as reported by a backend head or get request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub e_tag: Option<String>,
}

impl ObjectMetadata {
    /// Translate into a [`Stat`] for `path`.
    ///
    /// A missing content length is reported as zero bytes; a missing modification time
    /// is an error since there is nothing sensible to substitute.
    pub fn into_stat(self, path: &str) -> StorageResult<Stat> {
        let modified = self.last_modified.ok_or_else(|| {
            StorageError::InvalidMetadata(format!("no last-modified time for {}", path))
        })?;
        Ok(Stat {
            size: self.content_length.unwrap_or(0),
            modified,
        })
    }
}
