//! Repair of a single-quality VOD asset into a multirate rendition set.

use super::fetcher::PlaylistFetcher;
use super::publisher::PlaylistPublisher;
use super::validator::RenditionValidator;
use crate::domain::generator::generate;
use crate::domain::naming::parent;
use crate::domain::quality::QualityLadder;
use crate::error::{HlsError, Result};
use crate::ports::storage::ObjectStore;
use tracing::info;

/// Fetch, validate, generate and publish, for a configured set of qualities.
///
/// Re-running after a partial publish is safe: generation is pure and writes
/// overwrite. Concurrent runs for the same master are not coordinated and
/// must be serialised by the caller.
pub struct MultirateService<S> {
    storage: S,
    ladder: QualityLadder,
    qualities: Vec<String>,
}

impl<S> MultirateService<S>
where
    S: ObjectStore,
{
    pub fn new(storage: S, ladder: QualityLadder, qualities: Vec<String>) -> Self {
        Self {
            storage,
            ladder,
            qualities,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the keys written, rendition playlists first and master last.
    pub async fn generate_multirate_playlist(&self, master_key: &str) -> Result<Vec<String>> {
        let profiles = self.ladder.select(&self.qualities)?;
        if profiles.is_empty() {
            return Err(HlsError::Config("no multirate qualities configured".into()));
        }

        let fetcher = PlaylistFetcher::new(&self.storage);
        let master = fetcher.fetch_master(master_key).await?;
        let source = fetcher.fetch_sub_playlist(master_key, &master).await?;

        RenditionValidator::new(&self.storage)
            .validate(parent(master_key), &profiles)
            .await?;

        let set = generate(&source.playlist, &profiles);
        let written = PlaylistPublisher::new(&self.storage)
            .publish(master_key, &set)
            .await?;

        info!(
            master = master_key,
            source = %source.key,
            renditions = set.renditions.len(),
            segments = source.playlist.segments.len(),
            "Generated multirate playlist"
        );
        Ok(written)
    }
}
