//! Scripted in-memory client for exercising driver behavior the real stores never show:
//! bodiless responses, keyless entries, directory markers, failing deletes and backends
//! that ignore the list prefix.

use super::{GetObjectOutput, ListEntry, ListPage, MetadataDirective, ObjectClient};
use crate::metadata::ObjectMetadata;
use crate::stream::{byte_stream, read_to_bytes, ByteRange, ByteStream};
use crate::traits::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListRequest {
    pub prefix: String,
    pub max_keys: usize,
    pub token: Option<String>,
}

#[derive(Default)]
pub(crate) struct FakeClient {
    pub(crate) objects: Mutex<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    pub(crate) list_requests: Mutex<Vec<ListRequest>>,
    pub(crate) copies: Mutex<Vec<(String, String, MetadataDirective)>>,
    /// Cap applied on top of the requested page size.
    pub page_cap: Option<usize>,
    pub omit_body: bool,
    pub fail_head: bool,
    pub fail_delete: bool,
    pub fail_copy: bool,
    pub ignore_prefix: bool,
    /// Entries without a key, returned at the top of the first page.
    pub keyless_entries: usize,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, content: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::copy_from_slice(content), Utc::now()));
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn list_requests(&self) -> Vec<ListRequest> {
        self.list_requests.lock().unwrap().clone()
    }

    pub fn copies(&self) -> Vec<(String, String, MetadataDirective)> {
        self.copies.lock().unwrap().clone()
    }

    fn backend_error(message: &str) -> StorageError {
        StorageError::backend(std::io::Error::other(message.to_string()))
    }
}

#[async_trait]
impl ObjectClient for FakeClient {
    fn bucket(&self) -> &str {
        "fake-bucket"
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> StorageResult<GetObjectOutput> {
        let (content, modified) = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let content = match range {
            Some(range) => match range.to_offsets(content.len() as u64) {
                Some(offsets) => content.slice(offsets.start as usize..offsets.end as usize),
                None => Bytes::new(),
            },
            None => content,
        };

        let metadata = ObjectMetadata {
            content_length: Some(content.len() as u64),
            last_modified: Some(modified),
            e_tag: None,
        };
        let body = (!self.omit_body).then(|| byte_stream(content));
        Ok(GetObjectOutput { body, metadata })
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMetadata> {
        if self.fail_head {
            return Err(Self::backend_error("head timed out"));
        }
        let objects = self.objects.lock().unwrap();
        let (content, modified) = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectMetadata {
            content_length: Some(content.len() as u64),
            last_modified: Some(*modified),
            e_tag: None,
        })
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        _content_type: Option<&str>,
    ) -> StorageResult<()> {
        let content = read_to_bytes(body).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content, Utc::now()));
        Ok(())
    }

    async fn copy(
        &self,
        src_key: &str,
        dest_key: &str,
        directive: MetadataDirective,
    ) -> StorageResult<()> {
        self.copies
            .lock()
            .unwrap()
            .push((src_key.to_string(), dest_key.to_string(), directive));
        if self.fail_copy {
            return Err(Self::backend_error("copy refused"));
        }
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get(src_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(src_key.to_string()))?;
        objects.insert(dest_key.to_string(), object);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_delete {
            return Err(Self::backend_error("delete refused"));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        max_keys: usize,
        continuation_token: Option<&str>,
    ) -> StorageResult<ListPage> {
        self.list_requests.lock().unwrap().push(ListRequest {
            prefix: prefix.to_string(),
            max_keys,
            token: continuation_token.map(str::to_string),
        });

        let page_size = self.page_cap.map_or(max_keys, |cap| cap.min(max_keys));
        let objects = self.objects.lock().unwrap();

        let mut matching = objects
            .iter()
            .filter(|(key, _)| self.ignore_prefix || key.starts_with(prefix))
            .filter(|(key, _)| continuation_token.map_or(true, |token| key.as_str() > token))
            .map(|(key, (content, modified))| ListEntry {
                key: Some(key.clone()),
                size: content.len() as u64,
                last_modified: Some(*modified),
            });

        let mut entries: Vec<ListEntry> = Vec::new();
        if continuation_token.is_none() {
            entries.extend((0..self.keyless_entries).map(|_| ListEntry::default()));
        }
        entries.extend(matching.by_ref().take(page_size));

        let next_token = match matching.next() {
            Some(_) => entries.last().and_then(|entry| entry.key.clone()),
            None => None,
        };

        Ok(ListPage {
            entries,
            next_token,
        })
    }
}
