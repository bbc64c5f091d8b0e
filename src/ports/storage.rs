use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use thiserror::Error;

/// Body of an object as it is read from the store.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key {0} not found")]
    NotFound(String),

    #[error("i/o error on key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend error on key {key}: {message}")]
    Backend { key: String, message: String },
}

impl StorageError {
    pub fn key(&self) -> &str {
        match self {
            StorageError::NotFound(key) => key,
            StorageError::Io { key, .. } | StorageError::Backend { key, .. } => key,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an object for streaming reads.
    async fn read(&self, key: &str) -> Result<ByteStream, StorageError>;

    /// List every key starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Store `body` under `key`, replacing any existing object.
    async fn write(
        &self,
        key: &str,
        content_type: Option<&'static str>,
        body: Bytes,
    ) -> Result<(), StorageError>;
}

/// Read a whole object into memory.
pub async fn read_to_end<S>(store: &S, key: &str) -> Result<Bytes, StorageError>
where
    S: ObjectStore + ?Sized,
{
    let stream = store.read(key).await?;
    let body = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_read_to_end_joins_chunks() {
        let mut store = MockObjectStore::new();
        store.expect_read().returning(|_| {
            let chunks = vec![Ok(Bytes::from("#EXTM3U\n")), Ok(Bytes::from("#EXT-X-ENDLIST\n"))];
            Ok(Box::pin(stream::iter(chunks)) as ByteStream)
        });

        let body = read_to_end(&store, "rec/master.m3u8").await.unwrap();
        assert_eq!(&body[..], b"#EXTM3U\n#EXT-X-ENDLIST\n");
    }

    #[tokio::test]
    async fn test_read_to_end_wraps_stream_error_with_key() {
        let mut store = MockObjectStore::new();
        store.expect_read().returning(|_| {
            let chunks = vec![
                Ok(Bytes::from("#EXTM3U\n")),
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            ];
            Ok(Box::pin(stream::iter(chunks)) as ByteStream)
        });

        let err = read_to_end(&store, "rec/master.m3u8").await.unwrap_err();
        assert_eq!(err.key(), "rec/master.m3u8");
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
