use super::{GetObjectOutput, ListEntry, ListPage, MetadataDirective, ObjectClient};
use crate::metadata::ObjectMetadata;
use crate::stream::{ByteRange, ByteStream};
use crate::traits::{StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::{ByteStream as SdkByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bucketfs_core::ResolvedDriverConfig;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use tokio_util::io::ReaderStream;

/// Uploads at least this large go through multipart upload, one part at a time.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// [`ObjectClient`] speaking the S3 protocol, which TOS exposes on its S3 endpoints.
///
/// Keys are sent and returned verbatim and listing uses `ListObjectsV2` with the
/// service's own continuation tokens.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    pub fn new(bucket: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from resolved driver configuration.
    ///
    /// Without explicit credentials the SDK's default provider chain is used.
    pub async fn from_config(config: &ResolvedDriverConfig) -> Self {
        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(config.region.clone()));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .endpoint_url(&config.endpoint)
            .retry_config(retry_config);

        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key,
                secret,
                None,
                None,
                "bucketfs",
            ));
        }

        let shared = loader.load().await;
        Self::new(config.bucket.clone(), Client::new(&shared))
    }
}

/// Map an SDK failure, treating `missing` service errors and `NoSuchKey`/`NotFound`
/// codes as a missing object.
fn map_error<E, R>(key: &str, error: SdkError<E, R>, missing: fn(&E) -> bool) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let not_found = match &error {
        SdkError::ServiceError(service) => {
            missing(service.err())
                || matches!(service.err().code(), Some("NoSuchKey") | Some("NotFound"))
        }
        _ => false,
    };

    if not_found {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::backend(error)
    }
}

fn never<E>(_: &E) -> bool {
    false
}

fn to_utc(time: &SdkDateTime) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos()).ok_or_else(|| {
        StorageError::InvalidMetadata(format!("last-modified {} is out of range", time))
    })
}

fn length(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

fn metadata(
    content_length: Option<i64>,
    last_modified: Option<&SdkDateTime>,
    e_tag: Option<&str>,
) -> StorageResult<ObjectMetadata> {
    Ok(ObjectMetadata {
        content_length: length(content_length),
        last_modified: last_modified.map(to_utc).transpose()?,
        e_tag: e_tag.map(str::to_string),
    })
}

/// `x-amz-copy-source` value: bucket plus the source key, percent-encoded per segment.
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
    format!("{}/{}", bucket, encoded.join("/"))
}

/// Buffer chunks until a full part is held. Returns `true` once the body is exhausted.
async fn fill_part(body: &mut ByteStream, buffer: &mut BytesMut) -> StorageResult<bool> {
    while buffer.len() < PART_SIZE {
        match body.next().await {
            Some(chunk) => buffer.extend_from_slice(&chunk?),
            None => return Ok(true),
        }
    }
    Ok(false)
}

#[async_trait]
impl ObjectClient for S3Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> StorageResult<GetObjectOutput> {
        let range = range
            .filter(|r| r.start.is_some() || r.end.is_some())
            .map(|r| r.header_value());

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range)
            .send()
            .await
            .map_err(|e| map_error(key, e, |e| matches!(e, GetObjectError::NoSuchKey(_))))?;

        let metadata = metadata(
            output.content_length,
            output.last_modified.as_ref(),
            output.e_tag.as_deref(),
        )?;

        let body = ReaderStream::new(output.body.into_async_read())
            .map_err(StorageError::from)
            .boxed();

        Ok(GetObjectOutput {
            body: Some(body),
            metadata,
        })
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_error(key, e, |e| matches!(e, HeadObjectError::NotFound(_))))?;

        metadata(
            output.content_length,
            output.last_modified.as_ref(),
            output.e_tag.as_deref(),
        )
    }

    async fn put(
        &self,
        key: &str,
        mut body: ByteStream,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let content_type = content_type.map(str::to_string);
        let mut buffer = BytesMut::new();
        let mut exhausted = fill_part(&mut body, &mut buffer).await?;

        if exhausted {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .set_content_type(content_type)
                .body(SdkByteStream::from(buffer.freeze()))
                .send()
                .await
                .map_err(|e| map_error(key, e, never))?;
            return Ok(());
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type)
            .send()
            .await
            .map_err(|e| map_error(key, e, never))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::backend("no upload id returned for multipart upload"))?
            .to_string();

        let uploaded: StorageResult<usize> = async {
            let mut parts = Vec::new();
            loop {
                if !buffer.is_empty() {
                    let part_number = parts.len() as i32 + 1;
                    let output = self
                        .client
                        .upload_part()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(&upload_id)
                        .part_number(part_number)
                        .body(SdkByteStream::from(buffer.split().freeze()))
                        .send()
                        .await
                        .map_err(|e| map_error(key, e, never))?;

                    parts.push(
                        CompletedPart::builder()
                            .part_number(part_number)
                            .set_e_tag(output.e_tag)
                            .build(),
                    );
                }
                if exhausted {
                    break;
                }
                exhausted = fill_part(&mut body, &mut buffer).await?;
            }

            let count = parts.len();
            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| map_error(key, e, never))?;
            Ok(count)
        }
        .await;

        match uploaded {
            Ok(parts) => {
                tracing::debug!(
                    bucket = %self.bucket,
                    key = %key,
                    parts = parts,
                    "Multipart upload completed"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(abort_error) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        error = %abort_error,
                        bucket = %self.bucket,
                        key = %key,
                        "Failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn copy(
        &self,
        src_key: &str,
        dest_key: &str,
        directive: MetadataDirective,
    ) -> StorageResult<()> {
        let directive = match directive {
            MetadataDirective::Copy => aws_sdk_s3::types::MetadataDirective::Copy,
            MetadataDirective::Replace => aws_sdk_s3::types::MetadataDirective::Replace,
        };

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, src_key))
            .key(dest_key)
            .metadata_directive(directive)
            .send()
            .await
            .map_err(|e| map_error(src_key, e, never))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_error(key, e, never))
        {
            Ok(_) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        max_keys: usize,
        continuation_token: Option<&str>,
    ) -> StorageResult<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
            .max_keys(i32::try_from(max_keys).unwrap_or(i32::MAX))
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_error(prefix, e, never))?;

        let entries = output
            .contents()
            .iter()
            .map(|object| {
                Ok(ListEntry {
                    key: object.key.clone(),
                    size: length(object.size).unwrap_or(0),
                    last_modified: object.last_modified.as_ref().map(to_utc).transpose()?,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token.clone()
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectStorageDriver;
    use crate::stream::{byte_stream, read_to_bytes};
    use crate::traits::Driver;
    use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadOutput;
    use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput;
    use aws_sdk_s3::operation::copy_object::CopyObjectOutput;
    use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
    use aws_sdk_s3::operation::get_object::GetObjectOutput as SdkGetObjectOutput;
    use aws_sdk_s3::operation::head_object::HeadObjectOutput;
    use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
    use aws_sdk_s3::operation::put_object::PutObjectOutput;
    use aws_sdk_s3::operation::upload_part::UploadPartOutput;
    use aws_sdk_s3::types::error::{NoSuchKey, NotFound};
    use aws_sdk_s3::types::Object;
    use aws_smithy_mocks_experimental::{mock, mock_client, RuleMode};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const MODIFIED_SECS: i64 = 1_700_000_000;

    fn object(key: &str) -> Object {
        Object::builder()
            .key(key)
            .size(1)
            .last_modified(SdkDateTime::from_secs(MODIFIED_SECS))
            .build()
    }

    #[test]
    fn copy_source_encodes_each_segment() {
        assert_eq!(
            copy_source("b", "uploads/50%off #1.txt"),
            "b/uploads/50%25off%20%231.txt"
        );
    }

    #[tokio::test]
    async fn ranged_get_sends_inclusive_range_header() {
        let get = mock!(Client::get_object)
            .match_requests(|r| r.key() == Some("uploads/digits") && r.range() == Some("bytes=2-4"))
            .then_output(|| {
                SdkGetObjectOutput::builder()
                    .content_length(3)
                    .last_modified(SdkDateTime::from_secs(MODIFIED_SECS))
                    .body(SdkByteStream::from_static(b"234"))
                    .build()
            });
        let client = S3Client::new("b", mock_client!(aws_sdk_s3, RuleMode::MatchAny, &[&get]));

        let output = client
            .get("uploads/digits", Some(ByteRange::bounded(2, 4).unwrap()))
            .await
            .unwrap();
        assert_eq!(output.metadata.content_length, Some(3));
        assert_eq!(
            output.metadata.last_modified.unwrap().timestamp(),
            MODIFIED_SECS
        );
        let body = read_to_bytes(output.body.unwrap()).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"234"));
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let get = mock!(Client::get_object)
            .then_error(|| GetObjectError::NoSuchKey(NoSuchKey::builder().build()));
        let head = mock!(Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = S3Client::new(
            "b",
            mock_client!(aws_sdk_s3, RuleMode::MatchAny, &[&get, &head]),
        );

        assert!(client.get("k", None).await.err().unwrap().is_not_found());
        assert!(client.head("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn head_translates_to_stat() {
        let head = mock!(Client::head_object).then_output(|| {
            HeadObjectOutput::builder()
                .content_length(42)
                .last_modified(SdkDateTime::from_secs(MODIFIED_SECS))
                .e_tag("\"abc\"")
                .build()
        });
        let client = S3Client::new("b", mock_client!(aws_sdk_s3, RuleMode::MatchAny, &[&head]));

        let stat = client.head("k").await.unwrap().into_stat("k").unwrap();
        assert_eq!(stat.size, 42);
        assert_eq!(stat.modified.timestamp(), MODIFIED_SECS);
    }

    #[tokio::test]
    async fn small_bodies_use_a_single_put() {
        let put = mock!(Client::put_object)
            .match_requests(|r| r.key() == Some("img.png") && r.content_type() == Some("image/png"))
            .then_output(|| PutObjectOutput::builder().build());
        let client = S3Client::new("b", mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&put]));

        client
            .put("img.png", byte_stream(&b"png"[..]), Some("image/png"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn large_bodies_upload_in_parts() {
        let create = mock!(Client::create_multipart_upload)
            .then_output(|| CreateMultipartUploadOutput::builder().upload_id("up-1").build());
        let part_1 = mock!(Client::upload_part)
            .match_requests(|r| r.part_number() == Some(1) && r.upload_id() == Some("up-1"))
            .then_output(|| UploadPartOutput::builder().e_tag("e1").build());
        let part_2 = mock!(Client::upload_part)
            .match_requests(|r| r.part_number() == Some(2))
            .then_output(|| UploadPartOutput::builder().e_tag("e2").build());
        let complete = mock!(Client::complete_multipart_upload)
            .match_requests(|r| {
                r.multipart_upload()
                    .map(|upload| upload.parts().len() == 2)
                    .unwrap_or(false)
            })
            .then_output(|| CompleteMultipartUploadOutput::builder().build());
        let client = S3Client::new(
            "b",
            mock_client!(
                aws_sdk_s3,
                RuleMode::Sequential,
                &[&create, &part_1, &part_2, &complete]
            ),
        );

        let chunks: Vec<StorageResult<Bytes>> = vec![
            Ok(Bytes::from(vec![0u8; PART_SIZE])),
            Ok(Bytes::from_static(b"tail")),
        ];
        client
            .put("big.bin", futures::stream::iter(chunks).boxed(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_body_aborts_the_multipart_upload() {
        let aborted = Arc::new(AtomicBool::new(false));
        let flag = aborted.clone();

        let create = mock!(Client::create_multipart_upload)
            .then_output(|| CreateMultipartUploadOutput::builder().upload_id("up-1").build());
        let part = mock!(Client::upload_part)
            .then_output(|| UploadPartOutput::builder().e_tag("e1").build());
        let abort = mock!(Client::abort_multipart_upload)
            .match_requests(|r| r.upload_id() == Some("up-1"))
            .then_output(move || {
                flag.store(true, Ordering::SeqCst);
                AbortMultipartUploadOutput::builder().build()
            });
        let client = S3Client::new(
            "b",
            mock_client!(aws_sdk_s3, RuleMode::MatchAny, &[&create, &part, &abort]),
        );

        let chunks: Vec<StorageResult<Bytes>> = vec![
            Ok(Bytes::from(vec![0u8; PART_SIZE])),
            Err(StorageError::backend("connection reset")),
        ];
        let err = client
            .put("big.bin", futures::stream::iter(chunks).boxed(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Backend(_)));
        assert!(aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn copy_sends_encoded_source_and_directive() {
        let copy = mock!(Client::copy_object)
            .match_requests(|r| {
                r.copy_source() == Some("b/uploads/50%25off%231.txt")
                    && r.key() == Some("uploads/dest.txt")
                    && r.metadata_directive() == Some(&aws_sdk_s3::types::MetadataDirective::Copy)
            })
            .then_output(|| CopyObjectOutput::builder().build());
        let client = S3Client::new("b", mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&copy]));

        client
            .copy("uploads/50%off#1.txt", "uploads/dest.txt", MetadataDirective::Copy)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn driver_lists_raw_keys_and_skips_markers_across_pages() {
        let first = mock!(Client::list_objects_v2)
            .match_requests(|r| r.prefix() == Some("uploads/") && r.continuation_token().is_none())
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .contents(object("uploads/a/"))
                    .contents(object("uploads/a/50%off#1.txt"))
                    .is_truncated(true)
                    .next_continuation_token("t-1")
                    .build()
            });
        let second = mock!(Client::list_objects_v2)
            .match_requests(|r| r.continuation_token() == Some("t-1"))
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .contents(object("uploads/b.txt"))
                    .is_truncated(false)
                    .build()
            });
        let client = S3Client::new(
            "b",
            mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&first, &second]),
        );
        let driver = ObjectStorageDriver::new(Arc::new(client), "uploads");

        let listed: Vec<String> = driver.list(None).try_collect().await.unwrap();
        assert_eq!(listed, vec!["a/50%off#1.txt", "b.txt"]);
    }
}
