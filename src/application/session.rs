//! One source segment in, one encrypted segment per rendition out.

use super::staging::{SessionState, StagingArea};
use crate::domain::command::{EncoderCommand, DEFAULT_ENCODER_PATH, FIRST_SEGMENT_FILE};
use crate::domain::event::TranscodeEvent;
use crate::domain::naming::{parent, rendition_segment_key, resolve, segment_index};
use crate::domain::quality::{ImageProfile, QualityLadder, QualityProfile};
use crate::error::{HlsError, Result};
use crate::ports::encoder::EncoderRunner;
use crate::ports::storage::ObjectStore;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

pub const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";
pub const FRAME_CONTENT_TYPE: &str = "image/png";

/// A rendition segment produced by the encoder, opened for upload.
#[derive(Debug)]
pub struct EncodedSegment {
    pub rendition: String,
    pub path: PathBuf,
    file: tokio::fs::File,
}

/// Drives one [`TranscodeEvent`] through stage, encode and upload.
///
/// The session owns its [`StagingArea`]; dropping the session at any point
/// removes every temporary resource.
pub struct TranscodeSession<'a, S: ?Sized> {
    store: &'a S,
    event: &'a TranscodeEvent,
    profiles: Vec<QualityProfile>,
    staging: StagingArea,
    outputs: BTreeMap<String, PathBuf>,
    images_dir: Option<PathBuf>,
}

impl<'a, S> TranscodeSession<'a, S>
where
    S: ObjectStore + ?Sized,
{
    /// Resolve the requested renditions and stage the source segment.
    pub async fn open(
        store: &'a S,
        ladder: &QualityLadder,
        event: &'a TranscodeEvent,
        mut staging: StagingArea,
    ) -> Result<TranscodeSession<'a, S>> {
        let profiles = ladder.select(&event.qualities)?;

        let source = store
            .read(&event.key)
            .await
            .map_err(|e| HlsError::fetch(&event.key, e))?;
        staging
            .stage(source, &event.drm_key, &event.drm_initialization_vector)
            .await?;

        debug!(key = %event.key, renditions = profiles.len(), "Opened transcode session");
        Ok(Self {
            store,
            event,
            profiles,
            staging,
            outputs: BTreeMap::new(),
            images_dir: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.staging.state()
    }

    /// Build the encoder argument vector, creating one working directory per
    /// rendition (and one for frames when requested).
    pub fn command(&mut self, exec_path: &str) -> Result<Vec<String>> {
        let resources = self.staging.resources()?;
        let playlist = resources.playlist_path().to_path_buf();
        let key_info = resources.key_info_path().to_path_buf();

        let mut command = EncoderCommand::new(&playlist);
        for profile in &self.profiles {
            let dir = self.staging.work_dir(&profile.name)?;
            command = command.with_rendition(profile, &dir, &key_info);
            self.outputs.insert(profile.name.clone(), dir);
        }
        if self.event.extract_images {
            let images = ImageProfile::screenshare();
            let dir = self.staging.work_dir(images.name)?;
            command = command.with_images(&images, &dir);
            self.images_dir = Some(dir);
        }
        command.with_exec_path(exec_path).build()
    }

    /// Run the encoder to completion. Anything but exit code 0 fails.
    pub async fn encode<E>(&mut self, encoder: &E, exec_path: &str) -> Result<()>
    where
        E: EncoderRunner + ?Sized,
    {
        let argv = self.command(exec_path)?;
        info!(key = %self.event.key, encoder = %argv[0], "Running encoder");

        let code = encoder
            .run(&argv)
            .await
            .map_err(|source| HlsError::EncoderLaunch {
                path: argv[0].clone(),
                source,
            })?;
        if code != Some(0) {
            return Err(HlsError::EncoderExit { code });
        }
        self.staging.mark_encoded()
    }

    /// Open the single expected output segment of every rendition.
    pub async fn segments(&self) -> Result<Vec<EncodedSegment>> {
        if self.state() != SessionState::Encoded {
            return Err(HlsError::InvalidState {
                operation: "collect segments",
                state: self.state(),
            });
        }
        let mut segments = Vec::with_capacity(self.outputs.len());
        for (rendition, dir) in &self.outputs {
            let path = dir.join(FIRST_SEGMENT_FILE);
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|source| HlsError::MissingOutput {
                    rendition: rendition.clone(),
                    source,
                })?;
            segments.push(EncodedSegment {
                rendition: rendition.clone(),
                path,
                file,
            });
        }
        Ok(segments)
    }

    /// Upload every rendition segment next to the source segment. Returns the
    /// written keys, ordered by rendition name.
    pub async fn upload(&self) -> Result<Vec<String>> {
        let segments = self.segments().await?;
        let mut uploaded = Vec::with_capacity(segments.len());
        for mut segment in segments {
            let key = rendition_segment_key(&self.event.key, &segment.rendition);
            let mut body = Vec::new();
            segment
                .file
                .read_to_end(&mut body)
                .await
                .map_err(|source| HlsError::MissingOutput {
                    rendition: segment.rendition.clone(),
                    source,
                })?;
            self.store
                .write(&key, Some(SEGMENT_CONTENT_TYPE), Bytes::from(body))
                .await
                .map_err(|source| HlsError::Upload {
                    key: key.clone(),
                    source,
                })?;
            debug!(key = %key, rendition = %segment.rendition, "Uploaded rendition segment");
            uploaded.push(key);
        }
        Ok(uploaded)
    }

    /// Extracted frames, sorted by name.
    pub async fn frames(&self) -> Result<Vec<PathBuf>> {
        let dir = match &self.images_dir {
            Some(dir) if self.event.extract_images => dir,
            _ if !self.event.extract_images => {
                return Err(HlsError::Config("extract images is disabled".into()))
            }
            _ => {
                return Err(HlsError::InvalidState {
                    operation: "list frames",
                    state: self.state(),
                })
            }
        };
        if self.state() != SessionState::Encoded {
            return Err(HlsError::InvalidState {
                operation: "list frames",
                state: self.state(),
            });
        }

        let mut frames = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|source| HlsError::MissingOutput {
                rendition: ImageProfile::screenshare().name.to_string(),
                source,
            })?;
        while let Some(entry) = entries.next_entry().await.map_err(|source| {
            HlsError::MissingOutput {
                rendition: ImageProfile::screenshare().name.to_string(),
                source,
            }
        })? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains("frame") && name.ends_with(".png") {
                frames.push(entry.path());
            }
        }
        frames.sort();
        Ok(frames)
    }

    /// Upload extracted frames under `<dir>/images/<index>/`.
    pub async fn upload_frames(&self) -> Result<Vec<String>> {
        let frames = self.frames().await?;
        let prefix = resolve(
            parent(&self.event.key),
            &format!("images/{}", segment_index(&self.event.key)),
        );
        let mut uploaded = Vec::with_capacity(frames.len());
        for frame in frames {
            let name = frame
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = format!("{}/{}", prefix, name);
            let body = tokio::fs::read(&frame)
                .await
                .map_err(|source| HlsError::MissingOutput {
                    rendition: ImageProfile::screenshare().name.to_string(),
                    source,
                })?;
            self.store
                .write(&key, Some(FRAME_CONTENT_TYPE), Bytes::from(body))
                .await
                .map_err(|source| HlsError::Upload {
                    key: key.clone(),
                    source,
                })?;
            uploaded.push(key);
        }
        Ok(uploaded)
    }

    /// Release every temporary resource.
    pub fn close(mut self) {
        self.staging.close();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeReport {
    pub segments: Vec<String>,
    pub frames: Vec<String>,
}

/// Transcodes source segments with a fixed ladder, store and encoder.
pub struct TranscodeService<S, E> {
    storage: S,
    encoder: E,
    ladder: QualityLadder,
    encoder_path: String,
    staging_dir: Option<PathBuf>,
}

impl<S, E> TranscodeService<S, E>
where
    S: ObjectStore,
    E: EncoderRunner,
{
    pub fn new(storage: S, encoder: E, ladder: QualityLadder) -> Self {
        Self {
            storage,
            encoder,
            ladder,
            encoder_path: DEFAULT_ENCODER_PATH.to_string(),
            staging_dir: None,
        }
    }

    pub fn with_encoder_path(mut self, encoder_path: impl Into<String>) -> Self {
        self.encoder_path = encoder_path.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub async fn transcode(&self, event: &TranscodeEvent) -> Result<TranscodeReport> {
        let staging = match &self.staging_dir {
            Some(dir) => StagingArea::in_dir(dir),
            None => StagingArea::new(),
        };

        let mut session = TranscodeSession::open(&self.storage, &self.ladder, event, staging).await?;
        session.encode(&self.encoder, &self.encoder_path).await?;
        let segments = session.upload().await?;
        let frames = if event.extract_images {
            session.upload_frames().await?
        } else {
            Vec::new()
        };
        session.close();

        info!(
            key = %event.key,
            segments = segments.len(),
            frames = frames.len(),
            "Transcoded segment"
        );
        Ok(TranscodeReport { segments, frames })
    }
}
