//! Error taxonomy for the transcode and multirate pipelines.

use crate::application::staging::SessionState;
use crate::ports::storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Coarse classification used by callers to decide on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Staging,
    Encode,
    Fetch,
    Structure,
    Validation,
    Publish,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::Staging => "staging",
            ErrorKind::Encode => "encode",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Structure => "structure",
            ErrorKind::Validation => "validation",
            ErrorKind::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HlsError {
    #[error("quality for resolution {0} is not defined")]
    UnknownProfile(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("failed to stage {resource}: {source}")]
    Staging {
        resource: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch encoder {path}: {source}")]
    EncoderLaunch {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder exited with {}", exit_description(.code))]
    EncoderExit { code: Option<i32> },

    #[error("encoder command has no output groups")]
    EmptyCommand,

    #[error("missing encoded segment for rendition {rendition}: {source}")]
    MissingOutput {
        rendition: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unsupported playlist topology: {0}")]
    Structure(String),

    #[error("{} rendition object(s) missing: {}", .missing.len(), .missing.join(", "))]
    Validation { missing: Vec<String> },

    #[error("failed to upload {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to publish {key}: {source}")]
    Publish {
        key: String,
        #[source]
        source: StorageError,
    },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl HlsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HlsError::UnknownProfile(_) | HlsError::Config(_) | HlsError::InvalidState { .. } => {
                ErrorKind::Config
            }
            HlsError::Staging { .. } => ErrorKind::Staging,
            HlsError::EncoderLaunch { .. }
            | HlsError::EncoderExit { .. }
            | HlsError::EmptyCommand
            | HlsError::MissingOutput { .. } => ErrorKind::Encode,
            HlsError::Fetch { .. } => ErrorKind::Fetch,
            HlsError::Structure(_) => ErrorKind::Structure,
            HlsError::Validation { .. } => ErrorKind::Validation,
            HlsError::Upload { .. } | HlsError::Publish { .. } => ErrorKind::Publish,
        }
    }

    /// Config and structure faults need a human; everything else may succeed later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Config | ErrorKind::Structure)
    }

    pub(crate) fn fetch(
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        HlsError::Fetch {
            key: key.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HlsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(!HlsError::UnknownProfile("1080p".into()).is_retryable());
        assert!(!HlsError::Structure("two variants".into()).is_retryable());
        assert!(HlsError::Validation { missing: vec![] }.is_retryable());
        assert!(HlsError::EncoderExit { code: Some(1) }.is_retryable());
        assert_eq!(
            HlsError::Publish {
                key: "a/b.m3u8".into(),
                source: StorageError::NotFound("a/b.m3u8".into()),
            }
            .kind(),
            ErrorKind::Publish
        );
    }

    #[test]
    fn test_validation_message_lists_every_key() {
        let err = HlsError::Validation {
            missing: vec!["d/480p/480p_0000.ts".into(), "d/480p/480p_0001.ts".into()],
        };
        assert_eq!(
            err.to_string(),
            "2 rendition object(s) missing: d/480p/480p_0000.ts, d/480p/480p_0001.ts"
        );
    }

    #[test]
    fn test_exit_description() {
        assert_eq!(
            HlsError::EncoderExit { code: Some(234) }.to_string(),
            "encoder exited with status 234"
        );
        assert!(HlsError::EncoderExit { code: None }
            .to_string()
            .contains("signal"));
    }
}
