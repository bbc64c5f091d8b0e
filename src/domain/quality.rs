//! Quality ladder: the catalog of rendition profiles an asset can be fanned into.

use crate::error::{HlsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One rendition of the ladder. Immutable once the ladder is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    /// Rendition name, e.g. `720p`. Unique within a ladder.
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Encoder target bitrate in kbit/s.
    pub bitrate: u32,
    /// Encoder max rate in kbit/s.
    pub maxrate: u32,
    /// Encoder buffer size in kbit.
    pub bufsize: u32,
    /// Advertised bandwidth in bits/sec, only used in the master playlist.
    pub bandwidth: u64,
    /// Pass the video stream through instead of re-encoding it.
    #[serde(default)]
    pub copy_video: bool,
}

impl QualityProfile {
    /// `WxH`, as advertised in the master playlist.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Location of this rendition's media playlist relative to the master.
    pub fn playlist_uri(&self) -> String {
        format!("./{}/{}.m3u8", self.name, self.name)
    }

    /// Filename prefix of this rendition's segments.
    pub fn segment_prefix(&self) -> String {
        format!("{}_", self.name)
    }
}

/// Frame extraction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProfile {
    pub name: &'static str,
    pub fps: u32,
}

impl ImageProfile {
    pub fn screenshare() -> Self {
        Self {
            name: "screenshare",
            fps: 3,
        }
    }
}

/// Read-only registry of quality profiles keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityLadder {
    profiles: BTreeMap<String, QualityProfile>,
}

impl QualityLadder {
    /// Build a ladder, rejecting duplicate names.
    pub fn new(profiles: impl IntoIterator<Item = QualityProfile>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for profile in profiles {
            if profile.name.is_empty() {
                return Err(HlsError::Config("quality profile without a name".into()));
            }
            if let Some(previous) = map.insert(profile.name.clone(), profile) {
                return Err(HlsError::Config(format!(
                    "quality profile {} is defined twice",
                    previous.name
                )));
            }
        }
        Ok(Self { profiles: map })
    }

    /// The built-in 720p/480p/360p/144p ladder.
    pub fn standard() -> Self {
        let profiles = [
            ("720p", true, 1280, 720, 2800, 2996, 4200, 2_800_000),
            ("480p", false, 842, 480, 1400, 1498, 2100, 1_400_000),
            ("360p", false, 640, 360, 800, 856, 1200, 800_000),
            ("144p", false, 176, 144, 300, 350, 500, 300_000),
        ];
        let profiles = profiles
            .into_iter()
            .map(
                |(name, copy_video, width, height, bitrate, maxrate, bufsize, bandwidth)| {
                    (
                        name.to_string(),
                        QualityProfile {
                            name: name.to_string(),
                            width,
                            height,
                            bitrate,
                            maxrate,
                            bufsize,
                            bandwidth,
                            copy_video,
                        },
                    )
                },
            )
            .collect();
        Self { profiles }
    }

    /// Load a ladder from a JSON array of profiles.
    pub fn from_json(json: &str) -> Result<Self> {
        let profiles: Vec<QualityProfile> = serde_json::from_str(json)
            .map_err(|e| HlsError::Config(format!("invalid quality ladder: {}", e)))?;
        Self::new(profiles)
    }

    pub fn profile(&self, name: &str) -> Result<&QualityProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| HlsError::UnknownProfile(name.to_string()))
    }

    /// Resolve a set of names, sorted by name and without duplicates.
    pub fn select<N: AsRef<str>>(&self, names: &[N]) -> Result<Vec<QualityProfile>> {
        let mut selected = BTreeMap::new();
        for name in names {
            let profile = self.profile(name.as_ref())?;
            selected.insert(profile.name.clone(), profile.clone());
        }
        Ok(selected.into_values().collect())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self::standard()
    }
}
