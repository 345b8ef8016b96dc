use super::{GetObjectOutput, ListEntry, ListPage, MetadataDirective, ObjectClient};
use crate::metadata::ObjectMetadata;
use crate::stream::{ByteRange, ByteStream};
use crate::traits::{StorageError, StorageResult};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, GetOptions, GetRange, ObjectMeta, ObjectStore, ObjectStoreExt,
    PutMultipartOptions, WriteMultipart,
};
use std::sync::Arc;

/// Parts of a streamed upload allowed in flight at once.
const MAX_UPLOAD_CONCURRENCY: usize = 8;

/// [`ObjectClient`] over any `object_store` backend.
///
/// Keys are taken as raw `object_store` paths, never re-encoded, so a listed key can be
/// handed straight back to `get`. Such paths have no empty segments and no trailing `/`,
/// so stores reached through this client never hold directory markers.
///
/// Listing emulates string-prefix semantics: the store is listed from the prefix's parent
/// directory, starting just before the prefix, and stops at the first key sorting past it.
/// The continuation token is the last key of the previous page, resumed with
/// `list_with_offset`. Both rely on the store listing in key order, as S3-compatible stores
/// and the in-memory store do.
#[derive(Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStoreClient {
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }
}

fn location(key: &str) -> StorageResult<Path> {
    Path::parse(key).map_err(StorageError::backend)
}

/// A path sorting before every key that starts with `prefix`.
fn scan_start(prefix: &str) -> Option<Path> {
    let (last, _) = prefix.char_indices().last()?;
    let lower = &prefix[..last];
    if lower.is_empty() {
        return None;
    }
    Path::parse(lower).ok()
}

fn map_error(key: &str, error: ObjectStoreError) -> StorageError {
    match error {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => StorageError::backend(other),
    }
}

fn get_range(range: ByteRange) -> Option<GetRange> {
    match (range.start, range.end) {
        (Some(start), Some(end)) => Some(GetRange::Bounded(start..end.saturating_add(1))),
        (Some(start), None) => Some(GetRange::Offset(start)),
        (None, Some(suffix)) => Some(GetRange::Suffix(suffix)),
        (None, None) => None,
    }
}

fn metadata(meta: &ObjectMeta) -> ObjectMetadata {
    ObjectMetadata {
        content_length: Some(meta.size),
        last_modified: Some(meta.last_modified),
        e_tag: meta.e_tag.clone(),
    }
}

#[async_trait]
impl ObjectClient for ObjectStoreClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> StorageResult<GetObjectOutput> {
        let location = location(key)?;
        let options = GetOptions {
            range: range.and_then(get_range),
            ..Default::default()
        };

        let result = self
            .store()
            .get_opts(&location, options)
            .await
            .map_err(|e| map_error(key, e))?;

        let mut metadata = metadata(&result.meta);
        metadata.content_length = Some(result.range.end - result.range.start);

        let body = result.into_stream().map_err(StorageError::backend).boxed();

        Ok(GetObjectOutput {
            body: Some(body),
            metadata,
        })
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let location = location(key)?;
        let meta = self
            .store()
            .head(&location)
            .await
            .map_err(|e| map_error(key, e))?;
        Ok(metadata(&meta))
    }

    async fn put(
        &self,
        key: &str,
        mut body: ByteStream,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let location = location(key)?;

        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let options = PutMultipartOptions {
            attributes,
            ..Default::default()
        };

        let upload = self
            .store()
            .put_multipart_opts(&location, options)
            .await
            .map_err(|e| map_error(key, e))?;
        let mut writer = WriteMultipart::new(upload);

        let streamed: StorageResult<()> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                writer
                    .wait_for_capacity(MAX_UPLOAD_CONCURRENCY)
                    .await
                    .map_err(|e| map_error(key, e))?;
                writer.put(chunk);
            }
            Ok(())
        }
        .await;

        if let Err(e) = streamed {
            if let Err(abort_error) = writer.abort().await {
                tracing::warn!(
                    error = %abort_error,
                    bucket = %self.bucket,
                    key = %key,
                    "Failed to abort multipart upload"
                );
            }
            return Err(e);
        }

        writer.finish().await.map_err(|e| map_error(key, e))?;
        Ok(())
    }

    async fn copy(
        &self,
        src_key: &str,
        dest_key: &str,
        directive: MetadataDirective,
    ) -> StorageResult<()> {
        if directive == MetadataDirective::Replace {
            return Err(StorageError::backend(
                "object_store copies cannot replace object metadata",
            ));
        }
        let from = location(src_key)?;
        let to = location(dest_key)?;
        self.store()
            .copy(&from, &to)
            .await
            .map_err(|e| map_error(src_key, e))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = location(key)?;
        match self.store().delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::backend(e)),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        max_keys: usize,
        continuation_token: Option<&str>,
    ) -> StorageResult<ListPage> {
        let max_keys = max_keys.max(1);
        let parent = match prefix.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => Some(location(parent)?),
            _ => None,
        };
        let offset = match continuation_token {
            Some(token) => Some(location(token)?),
            None => scan_start(prefix),
        };

        let mut objects = match offset {
            Some(offset) => self.store().list_with_offset(parent.as_ref(), &offset),
            None => self.store().list(parent.as_ref()),
        };

        let mut entries: Vec<ListEntry> = Vec::new();
        let mut next_token = None;

        while let Some(meta) = objects
            .try_next()
            .await
            .map_err(|e| map_error(prefix, e))?
        {
            let key = meta.location.as_ref();
            if !key.starts_with(prefix) {
                if key > prefix {
                    break;
                }
                continue;
            }
            if entries.len() == max_keys {
                next_token = entries.last().and_then(|entry| entry.key.clone());
                break;
            }
            entries.push(ListEntry {
                key: Some(key.to_string()),
                size: meta.size,
                last_modified: Some(meta.last_modified),
            });
        }

        Ok(ListPage {
            entries,
            next_token,
        })
    }
}
