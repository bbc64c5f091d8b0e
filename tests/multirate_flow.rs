//! Transcode, validate, generate and publish an asset on the filesystem store.

use async_trait::async_trait;
use bytes::Bytes;
use multirate::application::fetcher::PlaylistFetcher;
use multirate::application::publisher::PlaylistPublisher;
use multirate::application::validator::RenditionValidator;
use multirate::domain::generator::generate;
use multirate::ports::encoder::EncoderRunner;
use multirate::ports::storage::{read_to_end, ObjectStore};
use multirate::{
    ErrorKind, FsStore, HlsError, MultirateService, QualityLadder, TranscodeEvent,
    TranscodeService,
};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::tempdir;

const MASTER: &str = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\nout.m3u8\n";
const SOURCE: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-PLAYLIST-TYPE:VOD
#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example/a\",IV=0x00000000000000000000000000000001
#EXTINF:6.000000,
out0000.ts
#EXTINF:4.500000,
out0001.ts
#EXT-X-ENDLIST
";

/// Writes the first segment of every `-hls_segment_filename` pattern.
struct FakeEncoder;

#[async_trait]
impl EncoderRunner for FakeEncoder {
    async fn run(&self, argv: &[String]) -> std::io::Result<Option<i32>> {
        for pair in argv.windows(2) {
            if pair[0] == "-hls_segment_filename" {
                let first = pair[1].replace("%04d", "0000");
                tokio::fs::write(&first, b"encoded").await?;
            }
        }
        Ok(Some(0))
    }
}

fn qualities() -> Vec<String> {
    vec!["720p".to_string(), "360p".to_string()]
}

async fn seed(store: &FsStore) {
    for (key, body) in [
        ("rec/a/master.m3u8", MASTER.as_bytes()),
        ("rec/a/out.m3u8", SOURCE.as_bytes()),
        ("rec/a/out0000.ts", b"source 0".as_slice()),
        ("rec/a/out0001.ts", b"source 1".as_slice()),
    ] {
        store
            .write(key, None, Bytes::copy_from_slice(body))
            .await
            .unwrap();
    }
}

async fn transcode_all(store: &FsStore, staging: &Path) {
    let service = TranscodeService::new(store.clone(), FakeEncoder, QualityLadder::standard())
        .with_staging_dir(staging);
    for key in ["rec/a/out0000.ts", "rec/a/out0001.ts"] {
        let event = TranscodeEvent {
            bucket: String::new(),
            key: key.to_string(),
            drm_key: vec![1; 16],
            drm_initialization_vector: "0x00000000000000000000000000000001".into(),
            qualities: qualities(),
            extract_images: false,
        };
        let report = service.transcode(&event).await.unwrap();
        assert_eq!(report.segments.len(), 2);
    }
}

async fn snapshot(store: &FsStore) -> BTreeMap<String, Bytes> {
    let mut objects = BTreeMap::new();
    for key in store.list("").await.unwrap() {
        let body = read_to_end(store, &key).await.unwrap();
        objects.insert(key, body);
    }
    objects
}

async fn text(store: &FsStore, key: &str) -> String {
    String::from_utf8(read_to_end(store, key).await.unwrap().to_vec()).unwrap()
}

#[tokio::test]
async fn test_publish_before_transcoding_reports_every_missing_segment() {
    let root = tempdir().unwrap();
    let store = FsStore::new(root.path());
    seed(&store).await;

    let service = MultirateService::new(store.clone(), QualityLadder::standard(), qualities());
    let err = service
        .generate_multirate_playlist("rec/a/master.m3u8")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    match err {
        HlsError::Validation { missing } => assert_eq!(missing.len(), 4),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(text(&store, "rec/a/master.m3u8").await, MASTER);
}

#[tokio::test]
async fn test_full_flow() {
    let root = tempdir().unwrap();
    let staging = tempdir().unwrap();
    let store = FsStore::new(root.path());
    seed(&store).await;

    transcode_all(&store, staging.path()).await;
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);

    let service = MultirateService::new(store.clone(), QualityLadder::standard(), qualities());
    let written = service
        .generate_multirate_playlist("rec/a/master.m3u8")
        .await
        .unwrap();
    assert_eq!(
        written,
        vec!["rec/a/360p/360p.m3u8", "rec/a/720p/720p.m3u8", "rec/a/master.m3u8"]
    );

    let master = text(&store, "rec/a/master.m3u8").await;
    let low = master.find("./360p/360p.m3u8").unwrap();
    let high = master.find("./720p/720p.m3u8").unwrap();
    assert!(low < high);
    assert!(master.contains("BANDWIDTH=800000,RESOLUTION=640x360"));

    let rendition = text(&store, "rec/a/720p/720p.m3u8").await;
    assert!(rendition.contains("#EXT-X-TARGETDURATION:6"));
    assert!(rendition.contains("URI=\"https://keys.example/a\""));
    assert!(rendition.contains("720p_0000.ts\n"));
    assert!(rendition.contains("720p_0001.ts\n"));
    assert!(rendition.contains("#EXT-X-ENDLIST"));
    assert!(!rendition.contains("out0000.ts"));

    // A published master has one variant per rendition and is not a source.
    let err = service
        .generate_multirate_playlist("rec/a/master.m3u8")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structure);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_republishing_same_source_is_idempotent() {
    let root = tempdir().unwrap();
    let staging = tempdir().unwrap();
    let store = FsStore::new(root.path());
    seed(&store).await;
    transcode_all(&store, staging.path()).await;

    let profiles = QualityLadder::standard().select(&qualities()).unwrap();
    let fetcher = PlaylistFetcher::new(&store);
    let master = fetcher.fetch_master("rec/a/master.m3u8").await.unwrap();
    let source = fetcher
        .fetch_sub_playlist("rec/a/master.m3u8", &master)
        .await
        .unwrap();

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        RenditionValidator::new(&store)
            .validate("rec/a", &profiles)
            .await
            .unwrap();
        let set = generate(&source.playlist, &profiles);
        PlaylistPublisher::new(&store)
            .publish("rec/a/master.m3u8", &set)
            .await
            .unwrap();
        snapshots.push(snapshot(&store).await);
    }
    assert_eq!(snapshots[0], snapshots[1]);
}
