use crate::keys::PathResolver;
use crate::metadata::Stat;
use crate::stream::{ByteRange, ByteStream};
use crate::traits::{Driver, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::{ReaderStream, StreamReader};

/// Local filesystem storage driver
///
/// Paths resolve under a base directory the same way object keys resolve under a root
/// prefix, so `..` can never leave it. Unlike the object-store driver, `move_path` is an
/// atomic rename.
#[derive(Clone)]
pub struct LocalDriver {
    base_path: PathBuf,
    resolver: PathResolver,
}

impl LocalDriver {
    /// Create a new LocalDriver rooted at `base_path`, creating the directory if needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalDriver {
            base_path,
            resolver: PathResolver::default(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_to_path(&self, path: &str) -> PathBuf {
        let key = self.resolver.resolve(path);
        if key.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(key)
        }
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn map_io(path: &str, error: io::Error) -> StorageError {
    if error.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::IoError(error)
    }
}

#[async_trait]
impl Driver for LocalDriver {
    async fn read(&self, path: &str, range: Option<ByteRange>) -> StorageResult<ByteStream> {
        let file_path = self.key_to_path(path);

        let mut file = fs::File::open(&file_path)
            .await
            .map_err(|e| map_io(path, e))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let reader: Box<dyn AsyncRead + Send + Unpin> = match range {
            None => Box::new(file),
            Some(range) => {
                let offsets = range.to_offsets(metadata.len()).ok_or_else(|| {
                    StorageError::InvalidRange(format!(
                        "{} not satisfiable for {} ({} bytes)",
                        range,
                        path,
                        metadata.len()
                    ))
                })?;
                file.seek(SeekFrom::Start(offsets.start)).await?;
                Box::new(file.take(offsets.end - offsets.start))
            }
        };

        tracing::debug!(
            path = %file_path.display(),
            range = %range.map(|r| r.header_value()).unwrap_or_default(),
            "Local storage read"
        );

        Ok(ReaderStream::new(reader).map_err(StorageError::from).boxed())
    }

    async fn stat(&self, path: &str) -> StorageResult<Stat> {
        let file_path = self.key_to_path(path);
        let metadata = fs::metadata(&file_path)
            .await
            .map_err(|e| map_io(path, e))?;

        // Directories have no object counterpart.
        if !metadata.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        Ok(Stat {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    async fn write(
        &self,
        path: &str,
        content: ByteStream,
        _content_type: Option<&str>,
    ) -> StorageResult<()> {
        let file_path = self.key_to_path(path);
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&file_path).await?;

        let mut file = fs::File::create(&file_path).await?;
        let mut reader = StreamReader::new(content.map_err(io::Error::other));

        let bytes_copied = tokio::io::copy(&mut reader, &mut file).await.map_err(|e| {
            tracing::error!(
                error = %e,
                path = %file_path.display(),
                "Local storage write failed"
            );
            StorageError::IoError(e)
        })?;

        file.sync_all().await?;

        tracing::info!(
            path = %file_path.display(),
            size_bytes = bytes_copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(())
    }

    async fn copy(&self, src: &str, dest: &str) -> StorageResult<()> {
        let from_path = self.key_to_path(src);
        let to_path = self.key_to_path(dest);

        if !fs::metadata(&from_path)
            .await
            .map_err(|e| map_io(src, e))?
            .is_file()
        {
            return Err(StorageError::NotFound(src.to_string()));
        }

        self.ensure_parent_dir(&to_path).await?;
        fs::copy(&from_path, &to_path)
            .await
            .map_err(|e| map_io(src, e))?;

        tracing::info!(
            from_path = %from_path.display(),
            to_path = %to_path.display(),
            "Local storage copy successful"
        );

        Ok(())
    }

    async fn move_path(&self, src: &str, dest: &str) -> StorageResult<()> {
        let from_path = self.key_to_path(src);
        let to_path = self.key_to_path(dest);

        self.ensure_parent_dir(&to_path).await?;
        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| map_io(src, e))?;

        tracing::info!(
            from_path = %from_path.display(),
            to_path = %to_path.display(),
            "Local storage move successful"
        );

        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let file_path = self.key_to_path(path);

        match fs::remove_file(&file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(path = %file_path.display(), "Local storage delete successful");

        Ok(())
    }

    fn list(&self, prefix: Option<&str>) -> BoxStream<'static, StorageResult<String>> {
        let walk = LocalWalk::new(
            self.base_path.clone(),
            self.resolver.resolve_prefix(prefix.unwrap_or("")),
        );
        stream::try_unfold(walk, |mut walk| async move {
            let batch = walk.next_batch().await?;
            Ok::<_, StorageError>(
                batch.map(|paths| (stream::iter(paths.into_iter().map(Ok)), walk)),
            )
        })
        .try_flatten()
        .boxed()
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

/// Depth-first walk yielding one directory's matching files at a time.
///
/// Files of a directory come before its subdirectories; siblings are sorted by name.
struct LocalWalk {
    base_path: PathBuf,
    prefix: String,
    pending: Vec<String>,
}

impl LocalWalk {
    fn new(base_path: PathBuf, prefix: String) -> Self {
        let start = prefix
            .rsplit_once('/')
            .map(|(parent, _)| parent.to_string())
            .unwrap_or_default();
        Self {
            base_path,
            prefix,
            pending: vec![start],
        }
    }

    fn may_contain_matches(&self, dir: &str) -> bool {
        let dir = format!("{}/", dir);
        dir.starts_with(&self.prefix) || self.prefix.starts_with(&dir)
    }

    async fn next_batch(&mut self) -> StorageResult<Option<Vec<String>>> {
        while let Some(dir) = self.pending.pop() {
            let dir_path = if dir.is_empty() {
                self.base_path.clone()
            } else {
                self.base_path.join(&dir)
            };

            let mut entries = match fs::read_dir(&dir_path).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let mut files = Vec::new();
            let mut subdirs = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let relative = if dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", dir, name)
                };
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if self.may_contain_matches(&relative) {
                        subdirs.push(relative);
                    }
                } else if file_type.is_file() && relative.starts_with(&self.prefix) {
                    files.push(relative);
                }
            }

            files.sort();
            subdirs.sort_by(|a, b| b.cmp(a));
            self.pending.extend(subdirs);

            if !files.is_empty() {
                return Ok(Some(files));
            }
        }
        Ok(None)
    }
}
