//! Operator binary: transcode one source segment, or publish the multirate
//! playlists of an uploaded asset.

use clap::{Parser, Subcommand};
use multirate::ports::storage::ObjectStore;
use multirate::{
    Config, FsStore, HlsError, MultirateService, ProcessEncoder, Result, TranscodeEvent,
    TranscodeService,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "multirate", version, about = "HLS multirate transcoding and publishing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcode one source segment into every requested rendition
    Transcode {
        /// JSON transcode event
        #[arg(long)]
        event: PathBuf,
    },
    /// Validate renditions and publish the multirate playlists of a master
    Publish {
        /// Object key of the single-quality master playlist
        master_key: String,
    },
}

fn read_event(path: &Path) -> Result<TranscodeEvent> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| HlsError::Config(format!("cannot read event {}: {}", path.display(), e)))?;
    serde_json::from_str(&json)
        .map_err(|e| HlsError::Config(format!("invalid event {}: {}", path.display(), e)))
}

async fn run<S: ObjectStore>(command: Command, config: &Config, store: S) -> Result<()> {
    let ladder = config.ladder()?;
    match command {
        Command::Transcode { event } => {
            let event = read_event(&event)?;
            let report = TranscodeService::new(store, ProcessEncoder::new(), ladder)
                .with_encoder_path(&config.encoder_path)
                .transcode(&event)
                .await?;
            for key in report.segments.iter().chain(&report.frames) {
                println!("{}", key);
            }
        }
        Command::Publish { master_key } => {
            let written = MultirateService::new(store, ladder, config.qualities.clone())
                .generate_multirate_playlist(&master_key)
                .await?;
            for key in written {
                println!("{}", key);
            }
        }
    }
    Ok(())
}

async fn dispatch(command: Command, config: &Config) -> Result<()> {
    #[cfg(feature = "aws")]
    {
        if let Some(bucket) = &config.s3_bucket {
            info!(bucket = %bucket, "Using S3 object store");
            let store = multirate::S3Store::from_env(bucket.clone()).await;
            return run(command, config, store).await;
        }
    }

    info!(root = %config.storage_dir.display(), "Using filesystem object store");
    run(command, config, FsStore::new(&config.storage_dir)).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dispatch(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                kind = %err.kind(),
                retryable = err.is_retryable(),
                error = %err,
                "Command failed"
            );
            ExitCode::FAILURE
        }
    }
}
