use crate::domain::hls::{MasterPlaylist, MediaPlaylist, Playlist};
use crate::domain::naming::{parent, resolve};
use crate::error::{HlsError, Result};
use crate::ports::storage::{read_to_end, ObjectStore};
use tracing::debug;

/// The single media playlist a source master points at.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePlaylist {
    pub key: String,
    pub playlist: MediaPlaylist,
}

/// Loads a single-variant master playlist and its media playlist.
pub struct PlaylistFetcher<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> PlaylistFetcher<'a, S>
where
    S: ObjectStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    async fn fetch(&self, key: &str) -> Result<Playlist> {
        let body = read_to_end(self.store, key)
            .await
            .map_err(|e| HlsError::fetch(key, e))?;
        let text = std::str::from_utf8(&body).map_err(|e| HlsError::fetch(key, e))?;
        Playlist::parse(text).map_err(|e| HlsError::fetch(key, e))
    }

    pub async fn fetch_master(&self, key: &str) -> Result<MasterPlaylist> {
        match self.fetch(key).await? {
            Playlist::Master(master) => {
                debug!(key, variants = master.variants.len(), "Fetched master playlist");
                Ok(master)
            }
            Playlist::Media(_) => Err(HlsError::Structure(format!(
                "{} is a media playlist, expected a master playlist",
                key
            ))),
        }
    }

    /// Key of the only variant of `master`. Zero or several variants is an
    /// unsupported topology.
    pub fn sub_playlist_key(master_key: &str, master: &MasterPlaylist) -> Result<String> {
        match master.variants.as_slice() {
            [variant] => Ok(resolve(parent(master_key), &variant.uri)),
            [] => Err(HlsError::Structure(format!(
                "master playlist {} doesn't contain a sub playlist",
                master_key
            ))),
            variants => Err(HlsError::Structure(format!(
                "master playlist {} contains {} sub playlists",
                master_key,
                variants.len()
            ))),
        }
    }

    pub async fn fetch_sub_playlist(
        &self,
        master_key: &str,
        master: &MasterPlaylist,
    ) -> Result<SourcePlaylist> {
        let key = Self::sub_playlist_key(master_key, master)?;
        match self.fetch(&key).await? {
            Playlist::Media(playlist) => {
                debug!(key = %key, segments = playlist.segments.len(), "Fetched media playlist");
                Ok(SourcePlaylist { key, playlist })
            }
            Playlist::Master(_) => Err(HlsError::Structure(format!(
                "{} is a master playlist, expected a media playlist",
                key
            ))),
        }
    }
}
