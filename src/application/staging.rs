//! Per-segment temporary resources handed to the encoder.
//!
//! A [`StagingArea`] owns every file and directory it creates. They are
//! removed by [`StagingArea::close`], which also runs on drop, so every exit
//! path of a session releases them.

use crate::domain::command::SEGMENT_DURATION;
use crate::domain::hls::{EncryptionKey, MediaPlaylist, PlaylistType};
use crate::error::{HlsError, Result};
use crate::ports::storage::ByteStream;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile, TempDir};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

/// URI written into the key info file; the encoder embeds it in its own
/// playlists, which are never published.
pub const KEY_URI_PLACEHOLDER: &str = "dummy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Staged,
    Encoded,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Staged => "staged",
            SessionState::Encoded => "encoded",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct StagedResources {
    segment: NamedTempFile,
    key_file: NamedTempFile,
    key_info_file: NamedTempFile,
    playlist: NamedTempFile,
}

impl StagedResources {
    pub fn segment_path(&self) -> &Path {
        self.segment.path()
    }

    pub fn key_file_path(&self) -> &Path {
        self.key_file.path()
    }

    pub fn key_info_path(&self) -> &Path {
        self.key_info_file.path()
    }

    pub fn playlist_path(&self) -> &Path {
        self.playlist.path()
    }

    fn into_files(self) -> [(&'static str, NamedTempFile); 4] {
        [
            ("segment", self.segment),
            ("key file", self.key_file),
            ("key info file", self.key_info_file),
            ("source playlist", self.playlist),
        ]
    }
}

/// Single-segment playlist pointing the encoder at the staged segment and key.
pub fn source_playlist(segment: &Path, key_file: &Path, iv: &str) -> MediaPlaylist {
    let mut playlist = MediaPlaylist::new(SEGMENT_DURATION);
    playlist.playlist_type = Some(PlaylistType::Vod);
    playlist.key = Some(EncryptionKey::aes128(key_file.display().to_string(), iv));
    playlist.add_segment(SEGMENT_DURATION as f64, segment.display().to_string());
    playlist.end_list = true;
    playlist
}

/// Content of the encoder's key info file: key URI, key path, IV.
pub fn key_info(key_file: &Path, iv: &str) -> String {
    format!("{}\n{}\n{}\n", KEY_URI_PLACEHOLDER, key_file.display(), iv)
}

fn staging_err(resource: &'static str) -> impl FnOnce(std::io::Error) -> HlsError {
    move |source| HlsError::Staging { resource, source }
}

// Save a `Stream` to a file
async fn stream_to_file(stream: ByteStream, path: &Path) -> std::io::Result<u64> {
    let mut body_reader = StreamReader::new(stream);
    let mut file = BufWriter::new(File::create(path).await?);
    let copied = tokio::io::copy(&mut body_reader, &mut file).await?;
    file.flush().await?;
    Ok(copied)
}

#[derive(Debug)]
pub struct StagingArea {
    base: PathBuf,
    state: SessionState,
    resources: Option<StagedResources>,
    work_dirs: BTreeMap<String, TempDir>,
}

impl StagingArea {
    /// Stage under the system temporary directory.
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir())
    }

    pub fn in_dir(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            state: SessionState::Created,
            resources: None,
            work_dirs: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(HlsError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn temp_file(&self, resource: &'static str, prefix: &str, suffix: &str) -> Result<NamedTempFile> {
        Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.base)
            .map_err(staging_err(resource))
    }

    /// Copy the source segment and write key, key info and source playlist.
    ///
    /// On failure everything created so far is removed and the area is closed.
    pub async fn stage(
        &mut self,
        source: ByteStream,
        key: &[u8],
        iv: &str,
    ) -> Result<&StagedResources> {
        self.require("stage", &[SessionState::Created])?;
        match self.materialize(source, key, iv).await {
            Ok(resources) => {
                debug!(
                    segment = %resources.segment_path().display(),
                    playlist = %resources.playlist_path().display(),
                    "Staged segment"
                );
                self.state = SessionState::Staged;
                Ok(&*self.resources.insert(resources))
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    async fn materialize(&self, source: ByteStream, key: &[u8], iv: &str) -> Result<StagedResources> {
        let segment = self.temp_file("segment", "segment", ".ts")?;
        stream_to_file(source, segment.path())
            .await
            .map_err(staging_err("segment"))?;

        let key_file = self.temp_file("key file", "key", ".key")?;
        tokio::fs::write(key_file.path(), key)
            .await
            .map_err(staging_err("key file"))?;

        let key_info_file = self.temp_file("key info file", "keyinfofile", ".txt")?;
        tokio::fs::write(key_info_file.path(), key_info(key_file.path(), iv))
            .await
            .map_err(staging_err("key info file"))?;

        let playlist = self.temp_file("source playlist", "in", ".m3u8")?;
        source_playlist(segment.path(), key_file.path(), iv)
            .write_to(playlist.path())
            .await
            .map_err(staging_err("source playlist"))?;

        Ok(StagedResources {
            segment,
            key_file,
            key_info_file,
            playlist,
        })
    }

    pub fn resources(&self) -> Result<&StagedResources> {
        self.require("read staged resources", &[SessionState::Staged, SessionState::Encoded])?;
        self.resources.as_ref().ok_or(HlsError::InvalidState {
            operation: "read staged resources",
            state: self.state,
        })
    }

    /// Working directory for one encoder output, created on first use.
    pub fn work_dir(&mut self, name: &str) -> Result<PathBuf> {
        self.require("create working directory", &[SessionState::Staged])?;
        if let Some(dir) = self.work_dirs.get(name) {
            return Ok(dir.path().to_path_buf());
        }
        let dir = Builder::new()
            .prefix(&format!("{}-", name))
            .tempdir_in(&self.base)
            .map_err(staging_err("working directory"))?;
        let path = dir.path().to_path_buf();
        self.work_dirs.insert(name.to_string(), dir);
        Ok(path)
    }

    pub fn mark_encoded(&mut self) -> Result<()> {
        self.require("mark encoded", &[SessionState::Staged])?;
        self.state = SessionState::Encoded;
        Ok(())
    }

    /// Remove every staged file and working directory. Safe to call any number
    /// of times; removal failures are logged and do not stop the others.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(resources) = self.resources.take() {
            for (resource, file) in resources.into_files() {
                let path = file.path().to_path_buf();
                if let Err(e) = file.close() {
                    warn!(resource, path = %path.display(), error = %e, "Failed to remove staged file");
                }
            }
        }
        for (name, dir) in std::mem::take(&mut self.work_dirs) {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(name = %name, path = %path.display(), error = %e, "Failed to remove working directory");
            }
        }
        self.state = SessionState::Closed;
    }
}

impl Default for StagingArea {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::tempdir;

    fn body(chunks: Vec<std::io::Result<Bytes>>) -> ByteStream {
        Box::pin(stream::iter(chunks))
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_stage_writes_all_resources() {
        let base = tempdir().unwrap();
        let mut area = StagingArea::in_dir(base.path());

        let source = body(vec![Ok(Bytes::from_static(b"\x47seg")), Ok(Bytes::from_static(b"ment"))]);
        let resources = area.stage(source, b"0123456789abcdef", "0xdeadbeef").await.unwrap();

        assert_eq!(std::fs::read(resources.segment_path()).unwrap(), b"\x47segment");
        assert_eq!(std::fs::read(resources.key_file_path()).unwrap(), b"0123456789abcdef");

        let info = std::fs::read_to_string(resources.key_info_path()).unwrap();
        let lines: Vec<_> = info.lines().collect();
        assert_eq!(
            lines,
            vec![
                "dummy",
                resources.key_file_path().to_str().unwrap(),
                "0xdeadbeef"
            ]
        );
        assert!(info.ends_with('\n'));

        let playlist = std::fs::read_to_string(resources.playlist_path()).unwrap();
        assert!(playlist.contains("#EXT-X-VERSION:3"));
        assert!(playlist.contains("#EXT-X-TARGETDURATION:6"));
        assert!(playlist.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(playlist.contains(&format!(
            "#EXT-X-KEY:METHOD=AES-128,URI=\"{}\",IV=0xdeadbeef",
            resources.key_file_path().display()
        )));
        assert!(playlist.contains(&format!(
            "#EXTINF:6.000000,\n{}\n",
            resources.segment_path().display()
        )));
        assert!(playlist.ends_with("#EXT-X-ENDLIST\n"));

        assert_eq!(area.state(), SessionState::Staged);
        assert_eq!(entries(base.path()), 4);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_removes_everything() {
        let base = tempdir().unwrap();
        let mut area = StagingArea::in_dir(base.path());
        area.stage(body(vec![Ok(Bytes::from_static(b"ts"))]), b"k", "0x1")
            .await
            .unwrap();
        let dir = area.work_dir("720p").unwrap();
        std::fs::write(dir.join("out0000.ts"), b"encoded").unwrap();
        assert_eq!(entries(base.path()), 5);

        area.close();
        area.close();

        assert_eq!(area.state(), SessionState::Closed);
        assert_eq!(entries(base.path()), 0);
        assert!(matches!(
            area.work_dir("480p"),
            Err(HlsError::InvalidState {
                state: SessionState::Closed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_failed_stage_leaves_nothing_behind() {
        let base = tempdir().unwrap();
        let mut area = StagingArea::in_dir(base.path());

        let source = body(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream cut")),
        ]);
        let err = area.stage(source, b"k", "0x1").await.unwrap_err();

        assert!(matches!(err, HlsError::Staging { resource: "segment", .. }));
        assert_eq!(area.state(), SessionState::Closed);
        assert_eq!(entries(base.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_base_dir_is_staging_error() {
        let base = tempdir().unwrap();
        let mut area = StagingArea::in_dir(base.path().join("missing"));
        let err = area
            .stage(body(vec![]), b"k", "0x1")
            .await
            .unwrap_err();
        assert!(matches!(err, HlsError::Staging { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_drop_releases_resources() {
        let base = tempdir().unwrap();
        {
            let mut area = StagingArea::in_dir(base.path());
            area.stage(body(vec![Ok(Bytes::from_static(b"ts"))]), b"k", "0x1")
                .await
                .unwrap();
            area.work_dir("360p").unwrap();
            assert_eq!(entries(base.path()), 5);
        }
        assert_eq!(entries(base.path()), 0);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let base = tempdir().unwrap();
        let mut area = StagingArea::in_dir(base.path());
        assert!(area.mark_encoded().is_err());
        assert!(area.resources().is_err());

        area.stage(body(vec![]), b"k", "0x1").await.unwrap();
        assert!(area.stage(body(vec![]), b"k", "0x1").await.is_err());
        area.mark_encoded().unwrap();
        assert_eq!(area.state(), SessionState::Encoded);
        assert!(area.resources().is_ok());
        assert!(area.work_dir("720p").is_err());
    }
}
