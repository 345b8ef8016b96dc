use crate::client::{MetadataDirective, ObjectClient};
use crate::keys::PathResolver;
use crate::list::ListCursor;
use crate::metadata::Stat;
use crate::stream::{ByteRange, ByteStream};
use crate::traits::{Driver, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

#[cfg(feature = "storage-tos")]
use crate::client::S3Client;
#[cfg(feature = "storage-tos")]
use bucketfs_core::ResolvedDriverConfig;

/// Object storage driver
///
/// Maps the driver operations onto a bucket-scoped [`ObjectClient`]. Every operation is a
/// single backend request except `move_path` (copy, then delete) and `list` (one request
/// per page).
#[derive(Clone)]
pub struct ObjectStorageDriver {
    client: Arc<dyn ObjectClient>,
    resolver: PathResolver,
}

impl ObjectStorageDriver {
    /// Create a driver over `client`, confining every key under `root`.
    pub fn new(client: Arc<dyn ObjectClient>, root: &str) -> Self {
        Self {
            client,
            resolver: PathResolver::new(root),
        }
    }

    /// Create a driver speaking the S3 protocol to the configured endpoint.
    #[cfg(feature = "storage-tos")]
    pub async fn from_config(config: &ResolvedDriverConfig) -> Self {
        let client = S3Client::from_config(config).await;

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = %config.endpoint,
            root = %config.root,
            "Object storage driver initialized"
        );

        Self::new(Arc::new(client), &config.root)
    }

    /// The normalized root prefix.
    pub fn root(&self) -> &str {
        self.resolver.root()
    }

    fn full_path(&self, path: &str) -> String {
        self.resolver.resolve(path)
    }

    fn log_failure(
        &self,
        operation: &str,
        key: &str,
        error: &StorageError,
        start: std::time::Instant,
    ) {
        if error.is_not_found() {
            return;
        }
        tracing::error!(
            error = %error,
            bucket = %self.client.bucket(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object storage {} failed",
            operation
        );
    }
}

/// Report a missing object under the caller's path rather than the full key.
fn not_found_as(path: &str, error: StorageError) -> StorageError {
    match error {
        StorageError::NotFound(_) => StorageError::NotFound(path.to_string()),
        other => other,
    }
}

#[async_trait]
impl Driver for ObjectStorageDriver {
    async fn read(&self, path: &str, range: Option<ByteRange>) -> StorageResult<ByteStream> {
        let key = self.full_path(path);
        let start = std::time::Instant::now();

        tracing::debug!(
            bucket = %self.client.bucket(),
            key = %key,
            range = %range.map(|r| r.header_value()).unwrap_or_default(),
            "Object storage read"
        );

        let output = self.client.get(&key, range).await.map_err(|e| {
            self.log_failure("read", &key, &e, start);
            not_found_as(path, e)
        })?;

        output.body.ok_or_else(|| {
            tracing::error!(
                bucket = %self.client.bucket(),
                key = %key,
                "Object storage returned no stream"
            );
            StorageError::StreamUnavailable(path.to_string())
        })
    }

    async fn stat(&self, path: &str) -> StorageResult<Stat> {
        let key = self.full_path(path);
        let start = std::time::Instant::now();

        let metadata = self.client.head(&key).await.map_err(|e| {
            self.log_failure("stat", &key, &e, start);
            not_found_as(path, e)
        })?;

        metadata.into_stat(path)
    }

    async fn write(
        &self,
        path: &str,
        content: ByteStream,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let key = self.full_path(path);
        let start = std::time::Instant::now();

        self.client
            .put(&key, content, content_type)
            .await
            .inspect_err(|e| self.log_failure("write", &key, e, start))?;

        tracing::info!(
            bucket = %self.client.bucket(),
            key = %key,
            content_type = ?content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object storage write successful"
        );

        Ok(())
    }

    async fn copy(&self, src: &str, dest: &str) -> StorageResult<()> {
        let src_key = self.full_path(src);
        let dest_key = self.full_path(dest);
        let start = std::time::Instant::now();

        self.client
            .copy(&src_key, &dest_key, MetadataDirective::Copy)
            .await
            .map_err(|e| {
                self.log_failure("copy", &src_key, &e, start);
                not_found_as(src, e)
            })?;

        tracing::info!(
            bucket = %self.client.bucket(),
            from_key = %src_key,
            to_key = %dest_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object storage copy successful"
        );

        Ok(())
    }

    /// Copy, then delete the source.
    ///
    /// Not atomic. If the delete fails its error is returned and the copied destination
    /// stays in place next to the source; nothing is rolled back. Moving a path onto
    /// itself leaves the object untouched.
    async fn move_path(&self, src: &str, dest: &str) -> StorageResult<()> {
        if self.full_path(src) == self.full_path(dest) {
            return self.stat(src).await.map(|_| ());
        }

        self.copy(src, dest).await?;

        if let Err(e) = self.delete(src).await {
            tracing::warn!(
                error = %e,
                bucket = %self.client.bucket(),
                src = %src,
                dest = %dest,
                "Move copied the object but could not delete the source; both now exist"
            );
            return Err(e);
        }

        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let key = self.full_path(path);
        let start = std::time::Instant::now();

        self.client
            .delete(&key)
            .await
            .inspect_err(|e| self.log_failure("delete", &key, e, start))?;

        tracing::info!(
            bucket = %self.client.bucket(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object storage delete successful"
        );

        Ok(())
    }

    fn list(&self, prefix: Option<&str>) -> BoxStream<'static, StorageResult<String>> {
        let prefix = self.resolver.resolve_prefix(prefix.unwrap_or(""));
        ListCursor::new(self.client.clone(), self.resolver.clone(), prefix).into_stream()
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Tos
    }
}
