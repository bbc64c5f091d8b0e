use crate::ports::storage::{ByteStream, ObjectStore, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Object store backed by a directory tree. Keys are `/`-separated paths
/// relative to `root`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        // Prevent directory traversal
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !valid {
            return Err(StorageError::Backend {
                key: key.to_string(),
                message: "invalid key".into(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn key_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Some(parts.join("/"))
    }
}

fn io_error(key: &str, source: io::Error) -> StorageError {
    if source.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn read(&self, key: &str) -> Result<ByteStream, StorageError> {
        let path = self.path(key)?;
        let file = File::open(&path).await.map_err(|e| io_error(key, e))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(StorageError::Io {
                        key: prefix.to_string(),
                        source,
                    })
                }
            };
            let walk_error = |source| StorageError::Io {
                key: prefix.to_string(),
                source,
            };
            while let Some(entry) = entries.next_entry().await.map_err(walk_error)? {
                let path = entry.path();
                if entry.file_type().await.map_err(walk_error)?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Some(key) = self.key_of(&path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn write(
        &self,
        key: &str,
        _content_type: Option<&'static str>,
        body: Bytes,
    ) -> Result<(), StorageError> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    key: key.to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&path, &body)
            .await
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }
}
