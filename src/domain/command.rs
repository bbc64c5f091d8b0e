//! Argument vector construction for the external encoder.

use super::quality::{ImageProfile, QualityProfile};
use crate::error::{HlsError, Result};
use std::path::Path;

pub const DEFAULT_ENCODER_PATH: &str = "/usr/bin/ffmpeg";

/// An override is only accepted when it still names this tool.
const ENCODER_FAMILY: &str = "ffmpeg";

/// Segment length requested from the HLS muxer, in seconds.
pub const SEGMENT_DURATION: u64 = 6;

/// Name of the first segment the muxer writes into a rendition directory.
pub const FIRST_SEGMENT_FILE: &str = "out0000.ts";

fn group<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Chain-style builder: each `with_*` call returns the extended command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    exec_path: String,
    options: Vec<Vec<String>>,
    args: Vec<Vec<String>>,
}

impl EncoderCommand {
    /// Global options reading the staged single-segment playlist.
    pub fn new(source_playlist: &Path) -> Self {
        Self {
            exec_path: DEFAULT_ENCODER_PATH.to_string(),
            options: vec![
                group(["-allowed_extensions", "ALL"]),
                group(["-y"]),
                group(["-copyts"]),
                vec!["-i".to_string(), path_str(source_playlist)],
            ],
            args: Vec::new(),
        }
    }

    /// Replace the executable, unless `exec_path` is empty or does not look
    /// like the encoder at all, in which case the current path is kept.
    pub fn with_exec_path(mut self, exec_path: &str) -> Self {
        if !exec_path.is_empty() && exec_path.contains(ENCODER_FAMILY) {
            self.exec_path = exec_path.to_string();
        }
        self
    }

    /// Append one rendition output group writing into `output_dir`.
    pub fn with_rendition(
        mut self,
        profile: &QualityProfile,
        output_dir: &Path,
        key_info_file: &Path,
    ) -> Self {
        self.args.push(group(["-c:a", "copy"]));
        if profile.copy_video {
            self.args.push(group(["-c:v", "copy"]));
        } else {
            self.args.extend([
                vec![
                    "-vf".to_string(),
                    format!(
                        "scale=w={}:h={}:force_original_aspect_ratio=decrease",
                        profile.width, profile.height
                    ),
                ],
                group(["-c:v", "libx264"]),
                group(["-preset", "veryfast"]),
                group(["-profile:v", "main"]),
                group(["-level", "3.1"]),
                group(["-crf", "20"]),
                group(["-sc_threshold", "0"]),
                group(["-g", "48"]),
                group(["-keyint_min", "48"]),
                group(["-tune", "zerolatency"]),
                vec!["-b:v".to_string(), format!("{}k", profile.bitrate)],
                vec!["-maxrate".to_string(), format!("{}k", profile.maxrate)],
                vec!["-bufsize".to_string(), format!("{}k", profile.bufsize)],
            ]);
        }
        self.args.extend([
            vec!["-hls_key_info_file".to_string(), path_str(key_info_file)],
            vec!["-hls_time".to_string(), SEGMENT_DURATION.to_string()],
            group(["-hls_playlist_type", "event"]),
            vec![
                "-hls_segment_filename".to_string(),
                path_str(&output_dir.join("out%04d.ts")),
            ],
            vec![path_str(&output_dir.join("out.m3u8"))],
        ]);
        self
    }

    /// Append a frame extraction group writing PNGs into `output_dir`.
    pub fn with_images(mut self, images: &ImageProfile, output_dir: &Path) -> Self {
        self.args.push(vec![
            "-vf".to_string(),
            format!("fps={}", images.fps),
            path_str(&output_dir.join("frame%04d.png")),
        ]);
        self
    }

    pub fn exec_path(&self) -> &str {
        &self.exec_path
    }

    /// Flatten into `[exec, options.., args..]`.
    pub fn build(&self) -> Result<Vec<String>> {
        if self.exec_path.is_empty() {
            return Err(HlsError::Config("encoder path is empty".into()));
        }
        if self.args.is_empty() {
            return Err(HlsError::EmptyCommand);
        }
        let mut argv = Vec::with_capacity(
            1 + self.options.iter().chain(&self.args).map(Vec::len).sum::<usize>(),
        );
        argv.push(self.exec_path.clone());
        argv.extend(self.options.iter().flatten().cloned());
        argv.extend(self.args.iter().flatten().cloned());
        Ok(argv)
    }
}
