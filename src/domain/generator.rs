//! Fan-out of one source media playlist into a multirate rendition set.

use super::hls::{MasterPlaylist, MediaPlaylist, MediaSegment, Resolution, VariantStream};
use super::naming::rewrite_segment_uri;
use super::quality::QualityProfile;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RenditionPlaylist {
    pub profile: QualityProfile,
    pub playlist: MediaPlaylist,
}

/// Output of one generation pass. Renditions are ordered by name and the
/// master lists its variants in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct MultirateSet {
    pub master: MasterPlaylist,
    pub renditions: Vec<RenditionPlaylist>,
}

/// Generate one media playlist per profile plus the master referencing them.
///
/// Each rendition copies version, target duration, media sequence, type and
/// encryption key from `source`; every segment URI has its `out` filename
/// prefix replaced by the rendition's segment prefix. Pure: the same input
/// always yields the same set.
pub fn generate(source: &MediaPlaylist, profiles: &[QualityProfile]) -> MultirateSet {
    let profiles: BTreeMap<&str, &QualityProfile> =
        profiles.iter().map(|p| (p.name.as_str(), p)).collect();

    let mut master = MasterPlaylist::default();
    let mut renditions = Vec::with_capacity(profiles.len());

    for profile in profiles.into_values() {
        let prefix = profile.segment_prefix();
        let playlist = MediaPlaylist {
            version: source.version,
            target_duration: source.target_duration,
            media_sequence: source.media_sequence,
            playlist_type: source.playlist_type,
            key: source.key.clone(),
            segments: source
                .segments
                .iter()
                .map(|segment| MediaSegment {
                    duration: segment.duration,
                    uri: rewrite_segment_uri(&segment.uri, &prefix),
                })
                .collect(),
            end_list: true,
        };

        master.variants.push(VariantStream {
            bandwidth: profile.bandwidth,
            resolution: Some(Resolution {
                width: profile.width,
                height: profile.height,
            }),
            uri: profile.playlist_uri(),
        });
        renditions.push(RenditionPlaylist {
            profile: profile.clone(),
            playlist,
        });
    }

    MultirateSet { master, renditions }
}
