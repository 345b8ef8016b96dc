//! Paginated enumeration over an [`ObjectClient`].
//!
//! [`ListCursor`] drives the continuation-token loop one page at a time; [`ListCursor::into_stream`]
//! flattens the pages into the lazy sequence of root-relative paths returned by `list`.

use crate::client::{ListPage, ObjectClient};
use crate::keys::PathResolver;
use crate::traits::{StorageError, StorageResult};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Entries requested per listing page.
pub const LIST_PAGE_SIZE: usize = 1000;

/// Cursor over the pages of one enumeration.
///
/// Created fresh for every `list` call; it cannot be rewound, only dropped and recreated.
pub struct ListCursor {
    client: Arc<dyn ObjectClient>,
    resolver: PathResolver,
    prefix: String,
    page_size: usize,
    token: Option<String>,
    exhausted: bool,
}

impl ListCursor {
    /// `prefix` is the full, already resolved key prefix sent to the backend.
    pub fn new(client: Arc<dyn ObjectClient>, resolver: PathResolver, prefix: String) -> Self {
        Self {
            client,
            resolver,
            prefix,
            page_size: LIST_PAGE_SIZE,
            token: None,
            exhausted: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn has_next_page(&self) -> bool {
        !self.exhausted
    }

    /// Fetch the next page and return its paths, or `None` once the backend has signalled
    /// the last page.
    pub async fn next_page(&mut self) -> StorageResult<Option<Vec<String>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .client
            .list_page(&self.prefix, self.page_size, self.token.as_deref())
            .await?;

        tracing::debug!(
            bucket = %self.client.bucket(),
            prefix = %self.prefix,
            entries = page.entries.len(),
            has_more = page.next_token.is_some(),
            "Fetched listing page"
        );

        let ListPage {
            entries,
            next_token,
        } = page;
        self.exhausted = next_token.is_none();
        self.token = next_token;

        let paths = entries
            .into_iter()
            .filter_map(|entry| entry.key)
            .filter_map(|key| self.relative_path(&key))
            .collect();
        Ok(Some(paths))
    }

    fn relative_path(&self, key: &str) -> Option<String> {
        // Pseudo-directory markers have no file behind them.
        if key.ends_with('/') {
            return None;
        }
        match self.resolver.relativize(key) {
            Some(path) if !path.is_empty() => Some(path.to_string()),
            _ => {
                tracing::debug!(
                    key = %key,
                    root = %self.resolver.root(),
                    "Skipping listed key outside the driver root"
                );
                None
            }
        }
    }

    /// Flatten every remaining page into one lazy stream of paths.
    pub fn into_stream(self) -> BoxStream<'static, StorageResult<String>> {
        stream::try_unfold(self, |mut cursor| async move {
            let page = cursor.next_page().await?;
            Ok::<_, StorageError>(
                page.map(|paths| (stream::iter(paths.into_iter().map(Ok)), cursor)),
            )
        })
        .try_flatten()
        .boxed()
    }
}
