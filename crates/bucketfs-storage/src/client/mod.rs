//! Object-store client capability consumed by [`ObjectStorageDriver`].
//!
//! A client is bound to one bucket and exposes the object-level verbs the driver needs.
//! Connection setup, authentication, request signing and transport retries all live behind
//! this trait.
//!
//! [`ObjectStorageDriver`]: crate::object::ObjectStorageDriver

use crate::metadata::ObjectMetadata;
use crate::stream::{ByteRange, ByteStream};
use crate::traits::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(test)]
pub(crate) mod fake;
#[cfg(feature = "storage-tos")]
mod s3;
#[cfg(feature = "storage-object-store")]
mod store;

#[cfg(feature = "storage-tos")]
pub use s3::S3Client;
#[cfg(feature = "storage-object-store")]
pub use store::ObjectStoreClient;

/// What a server-side copy does with the source object's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataDirective {
    /// Keep the source metadata as-is.
    Copy,
    /// Replace it with metadata supplied on the request.
    Replace,
}

/// Response to a get request.
pub struct GetObjectOutput {
    /// `None` when the backend answered without a consumable body.
    pub body: Option<ByteStream>,
    pub metadata: ObjectMetadata,
}

/// One entry of a listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListEntry {
    pub key: Option<String>,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    /// Token for the next page; `None` on the last page.
    pub next_token: Option<String>,
}

/// Object-level verbs of a single bucket.
///
/// Implementations report a missing object as `StorageError::NotFound` and wrap every
/// other failure in `StorageError::Backend` without reinterpreting it.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Bucket this client operates on.
    fn bucket(&self) -> &str;

    async fn get(&self, key: &str, range: Option<ByteRange>) -> StorageResult<GetObjectOutput>;

    async fn head(&self, key: &str) -> StorageResult<ObjectMetadata>;

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Server-side copy within the bucket.
    async fn copy(
        &self,
        src_key: &str,
        dest_key: &str,
        directive: MetadataDirective,
    ) -> StorageResult<()>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Fetch up to `max_keys` entries whose key starts with `prefix`, continuing after
    /// `continuation_token` when given.
    ///
    /// Keys are returned exactly as stored, including any trailing `/` of directory
    /// markers.
    async fn list_page(
        &self,
        prefix: &str,
        max_keys: usize,
        continuation_token: Option<&str>,
    ) -> StorageResult<ListPage>;
}
