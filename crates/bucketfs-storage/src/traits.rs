//! Storage driver trait
//!
//! This module defines the `Driver` trait that every storage backend implements, and the
//! error type shared by all of them.

use crate::metadata::Stat;
use crate::stream::{ByteRange, ByteStream};
use crate::StorageBackend;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    /// The backend answered successfully but handed back nothing to read.
    #[error("No stream returned for file \"{0}\"")]
    StreamUnavailable(String),

    #[error("Invalid byte range: {0}")]
    InvalidRange(String),

    #[error("Invalid object metadata: {0}")]
    InvalidMetadata(String),

    /// Any other backend failure, passed through untouched.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn backend(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        StorageError::Backend(error.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage driver abstraction
///
/// All paths are relative to the driver's root. Implementations hold no mutable
/// per-call state, so one instance can serve any number of concurrent callers.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a stream over the object, or over `range` of it.
    async fn read(&self, path: &str, range: Option<ByteRange>) -> StorageResult<ByteStream>;

    /// Size and modification time, queried fresh on every call.
    async fn stat(&self, path: &str) -> StorageResult<Stat>;

    /// Whether `stat` succeeds.
    ///
    /// Every failure counts as absence, so a transient backend error reads as `false`.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Stream `content` to `path`, replacing whatever was there.
    async fn write(
        &self,
        path: &str,
        content: ByteStream,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    async fn copy(&self, src: &str, dest: &str) -> StorageResult<()>;

    /// Move `src` to `dest`.
    ///
    /// Whether this is atomic depends on the backend; see the implementations.
    async fn move_path(&self, src: &str, dest: &str) -> StorageResult<()>;

    /// Delete `path`. Deleting a missing path is not an error.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Lazily enumerate every file under `prefix` (everything when `None`), as paths
    /// relative to the root. Each call starts a fresh enumeration.
    fn list(&self, prefix: Option<&str>) -> BoxStream<'static, StorageResult<String>>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
