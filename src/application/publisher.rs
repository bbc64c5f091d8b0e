use crate::domain::generator::MultirateSet;
use crate::domain::hls::MPEGURL_CONTENT_TYPE;
use crate::domain::naming::{parent, resolve};
use crate::error::{HlsError, Result};
use crate::ports::storage::ObjectStore;
use bytes::Bytes;
use tracing::{debug, info};

/// Writes a generated [`MultirateSet`] next to its master playlist.
///
/// Writes overwrite unconditionally and are not transactional: a failure
/// leaves the playlists written so far in place. Rendition playlists go
/// first and the master last, so a partial pass never publishes a master
/// pointing at missing renditions.
pub struct PlaylistPublisher<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> PlaylistPublisher<'a, S>
where
    S: ObjectStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    async fn write(&self, key: &str, body: String) -> Result<()> {
        self.store
            .write(key, Some(MPEGURL_CONTENT_TYPE), Bytes::from(body))
            .await
            .map_err(|source| HlsError::Publish {
                key: key.to_string(),
                source,
            })?;
        debug!(key, "Published playlist");
        Ok(())
    }

    /// Returns the written keys in write order.
    pub async fn publish(&self, master_key: &str, set: &MultirateSet) -> Result<Vec<String>> {
        let dir = parent(master_key);
        let mut written = Vec::with_capacity(set.renditions.len() + 1);

        for rendition in &set.renditions {
            let key = resolve(dir, &rendition.profile.playlist_uri());
            self.write(&key, rendition.playlist.to_string()).await?;
            written.push(key);
        }
        self.write(master_key, set.master.to_string()).await?;
        written.push(master_key.to_string());

        info!(master = master_key, playlists = written.len(), "Published multirate playlists");
        Ok(written)
    }
}
