//! Multirate - HLS rendition fan-out library
//!
//! Hexagonal Architecture:
//! - domain/: Pure logic (quality ladder, playlists, naming, encoder command)
//! - ports/: Trait definitions (object store, encoder runner)
//! - adapters/: Concrete implementations
//! - application/: Transcode session and multirate services
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Filesystem object store and encoder subprocess
//! - `aws`: S3 object store
//! - `full`: All features

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use application::multirate::MultirateService;
pub use application::session::{TranscodeReport, TranscodeService, TranscodeSession};
pub use config::Config;
pub use domain::event::TranscodeEvent;
pub use domain::quality::{QualityLadder, QualityProfile};
pub use error::{ErrorKind, HlsError, Result};

#[cfg(feature = "local")]
pub use adapters::local::{FsStore, ProcessEncoder};

#[cfg(feature = "aws")]
pub use adapters::aws::S3Store;
