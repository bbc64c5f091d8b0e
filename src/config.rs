//! Configuration loaded from the environment.

use crate::domain::command::DEFAULT_ENCODER_PATH;
use crate::domain::quality::QualityLadder;
use crate::error::{HlsError, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_QUALITIES: &str = "720p,480p,360p";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Encoder binary, `ENCODER_PATH`.
    pub encoder_path: String,
    /// Renditions produced by the multirate pass, `MULTIRATE_QUALITIES`.
    pub qualities: Vec<String>,
    /// JSON ladder replacing the built-in one, `LADDER_FILE`.
    pub ladder_file: Option<PathBuf>,
    /// Root of the filesystem object store, `STORAGE_DIR`.
    #[cfg(feature = "local")]
    pub storage_dir: PathBuf,
    /// Bucket of the S3 object store, `S3_BUCKET`.
    #[cfg(feature = "aws")]
    pub s3_bucket: Option<String>,
}

impl Config {
    /// Load configuration from environment variables, after `.env`.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let qualities = lookup("MULTIRATE_QUALITIES").unwrap_or_else(|| DEFAULT_QUALITIES.to_string());

        Self {
            encoder_path: lookup("ENCODER_PATH").unwrap_or_else(|| DEFAULT_ENCODER_PATH.to_string()),
            qualities: qualities
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect(),
            ladder_file: lookup("LADDER_FILE").map(PathBuf::from),
            #[cfg(feature = "local")]
            storage_dir: PathBuf::from(lookup("STORAGE_DIR").unwrap_or_else(|| String::from("./"))),
            #[cfg(feature = "aws")]
            s3_bucket: lookup("S3_BUCKET").filter(|b| !b.is_empty()),
        }
    }

    /// The configured ladder, or the standard one.
    pub fn ladder(&self) -> Result<QualityLadder> {
        match &self.ladder_file {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    HlsError::Config(format!("cannot read ladder file {}: {}", path.display(), e))
                })?;
                QualityLadder::from_json(&json)
            }
            None => Ok(QualityLadder::standard()),
        }
    }
}
