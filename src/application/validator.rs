use crate::domain::naming::{is_source_segment, rendition_segment_key};
use crate::domain::quality::QualityProfile;
use crate::error::{HlsError, Result};
use crate::ports::storage::ObjectStore;
use std::collections::HashSet;
use tracing::{debug, info};

/// Expected rendition keys absent from `listing`, for every source segment of
/// `dir` and every profile. Order follows the listing, then `profiles`.
pub fn missing_renditions(dir: &str, listing: &[String], profiles: &[QualityProfile]) -> Vec<String> {
    let present: HashSet<&str> = listing.iter().map(String::as_str).collect();
    listing
        .iter()
        .filter(|key| is_source_segment(dir, key))
        .flat_map(|key| {
            profiles
                .iter()
                .map(move |profile| rendition_segment_key(key, &profile.name))
        })
        .filter(|expected| !present.contains(expected.as_str()))
        .collect()
}

/// Checks that every uploaded source segment has a copy per rendition.
pub struct RenditionValidator<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> RenditionValidator<'a, S>
where
    S: ObjectStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Fails with every missing key at once, so one pass yields the whole
    /// repair list.
    pub async fn validate(&self, dir: &str, profiles: &[QualityProfile]) -> Result<()> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let listing = self
            .store
            .list(&prefix)
            .await
            .map_err(|e| HlsError::fetch(dir, e))?;

        let sources = listing.iter().filter(|k| is_source_segment(dir, k)).count();
        let missing = missing_renditions(dir, &listing, profiles);
        for key in &missing {
            debug!(key = %key, "Missing rendition object");
        }
        info!(
            dir,
            sources,
            renditions = profiles.len(),
            missing = missing.len(),
            "Validated multirate objects"
        );

        if missing.is_empty() {
            Ok(())
        } else {
            Err(HlsError::Validation { missing })
        }
    }
}
