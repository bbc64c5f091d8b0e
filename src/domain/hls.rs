//! HLS playlist model: the VOD subset of media and master playlists this
//! system reads and writes.

use regex::Regex;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub const MPEGURL_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub duration: f64,
    pub uri: String,
}

/// `EXT-X-KEY` descriptor, carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    pub method: String,
    pub uri: Option<String>,
    pub iv: Option<String>,
}

impl EncryptionKey {
    pub fn aes128(uri: impl Into<String>, iv: impl Into<String>) -> Self {
        Self {
            method: "AES-128".to_string(),
            uri: Some(uri.into()),
            iv: Some(iv.into()),
        }
    }
}

impl fmt::Display for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "METHOD={}", self.method)?;
        if let Some(uri) = &self.uri {
            write!(f, ",URI=\"{}\"", uri)?;
        }
        if let Some(iv) = &self.iv {
            write!(f, ",IV={}", iv)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Event,
}

impl fmt::Display for PlaylistType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaylistType::Vod => f.write_str("VOD"),
            PlaylistType::Event => f.write_str("EVENT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub version: u8,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub playlist_type: Option<PlaylistType>,
    pub key: Option<EncryptionKey>,
    pub segments: Vec<MediaSegment>,
    pub end_list: bool,
}

impl MediaPlaylist {
    pub fn new(target_duration: u64) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            playlist_type: None,
            key: None,
            segments: Vec::new(),
            end_list: true,
        }
    }

    pub fn add_segment(&mut self, duration: f64, uri: String) {
        self.segments.push(MediaSegment { duration, uri });
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = File::create(path).await?;
        file.write_all(self.to_string().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl fmt::Display for MediaPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        writeln!(f, "#EXT-X-VERSION:{}", self.version)?;
        writeln!(f, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;
        writeln!(f, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence)?;
        if let Some(pt) = &self.playlist_type {
            writeln!(f, "#EXT-X-PLAYLIST-TYPE:{}", pt)?;
        }
        if let Some(key) = &self.key {
            writeln!(f, "#EXT-X-KEY:{}", key)?;
        }
        for segment in &self.segments {
            writeln!(f, "#EXTINF:{:.6},", segment.duration)?;
            writeln!(f, "{}", segment.uri)?;
        }
        if self.end_list {
            writeln!(f, "#EXT-X-ENDLIST")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("invalid resolution {}", s))?;
        Ok(Resolution {
            width: w.parse().map_err(|_| format!("invalid width in {}", s))?,
            height: h.parse().map_err(|_| format!("invalid height in {}", s))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantStream {
    pub bandwidth: u64,
    pub resolution: Option<Resolution>,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterPlaylist {
    pub variants: Vec<VariantStream>,
}

impl fmt::Display for MasterPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        for variant in &self.variants {
            write!(f, "#EXT-X-STREAM-INF:BANDWIDTH={}", variant.bandwidth)?;
            if let Some(resolution) = &variant.resolution {
                write!(f, ",RESOLUTION={}", resolution)?;
            }
            writeln!(f)?;
            writeln!(f, "{}", variant.uri)?;
        }
        Ok(())
    }
}

/// Either kind of playlist, as read from storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([A-Z0-9-]+)=("[^"]*"|[^,]*)"#).expect("valid regex"))
}

fn attributes(list: &str) -> Vec<(&str, &str)> {
    attribute_re()
        .captures_iter(list)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str().trim_matches('"');
            Some((name, value))
        })
        .collect()
}

fn parse_number<T: FromStr>(line: usize, tag: &str, value: &str) -> Result<T, ParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| ParseError::new(line, format!("invalid {} value {:?}", tag, value)))
}

impl Playlist {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut lines = input
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        match lines.next() {
            Some((_, "#EXTM3U")) => {}
            Some((n, _)) => return Err(ParseError::new(n, "missing #EXTM3U header")),
            None => return Err(ParseError::new(0, "empty playlist")),
        }

        let mut media = MediaPlaylist::new(0);
        media.version = 1;
        media.end_list = false;
        let mut master = MasterPlaylist::default();

        let mut pending_duration: Option<f64> = None;
        let mut pending_variant: Option<(u64, Option<Resolution>)> = None;

        for (n, line) in lines {
            if let Some(value) = line.strip_prefix("#EXT-X-VERSION:") {
                media.version = parse_number(n, "EXT-X-VERSION", value)?;
            } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                let target: f64 = parse_number(n, "EXT-X-TARGETDURATION", value)?;
                media.target_duration = target.ceil() as u64;
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                media.media_sequence = parse_number(n, "EXT-X-MEDIA-SEQUENCE", value)?;
            } else if let Some(value) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
                media.playlist_type = match value.trim() {
                    "VOD" => Some(PlaylistType::Vod),
                    "EVENT" => Some(PlaylistType::Event),
                    other => {
                        return Err(ParseError::new(
                            n,
                            format!("unknown playlist type {}", other),
                        ))
                    }
                };
            } else if let Some(value) = line.strip_prefix("#EXT-X-KEY:") {
                // Only the first key applies; rotation is not supported.
                if media.key.is_some() {
                    continue;
                }
                let mut key = EncryptionKey {
                    method: String::new(),
                    uri: None,
                    iv: None,
                };
                for (name, value) in attributes(value) {
                    match name {
                        "METHOD" => key.method = value.to_string(),
                        "URI" => key.uri = Some(value.to_string()),
                        "IV" => key.iv = Some(value.to_string()),
                        _ => {}
                    }
                }
                if key.method.is_empty() {
                    return Err(ParseError::new(n, "EXT-X-KEY without METHOD"));
                }
                if key.method != "NONE" {
                    media.key = Some(key);
                }
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                let duration = value.split(',').next().unwrap_or_default();
                pending_duration = Some(parse_number(n, "EXTINF", duration)?);
            } else if let Some(value) = line.strip_prefix("#EXT-X-STREAM-INF:") {
                let mut bandwidth = None;
                let mut resolution = None;
                for (name, value) in attributes(value) {
                    match name {
                        "BANDWIDTH" => bandwidth = Some(parse_number(n, "BANDWIDTH", value)?),
                        "RESOLUTION" => {
                            resolution =
                                Some(value.parse().map_err(|e| ParseError::new(n, e))?)
                        }
                        _ => {}
                    }
                }
                let bandwidth = bandwidth
                    .ok_or_else(|| ParseError::new(n, "EXT-X-STREAM-INF without BANDWIDTH"))?;
                pending_variant = Some((bandwidth, resolution));
            } else if line == "#EXT-X-ENDLIST" {
                media.end_list = true;
            } else if line.starts_with('#') {
                // Unknown tag or comment.
            } else if let Some(duration) = pending_duration.take() {
                media.add_segment(duration, line.to_string());
            } else if let Some((bandwidth, resolution)) = pending_variant.take() {
                master.variants.push(VariantStream {
                    bandwidth,
                    resolution,
                    uri: line.to_string(),
                });
            } else {
                return Err(ParseError::new(
                    n,
                    format!("uri {} without EXTINF or EXT-X-STREAM-INF", line),
                ));
            }
        }

        if pending_duration.is_some() || pending_variant.is_some() {
            return Err(ParseError::new(0, "playlist ends before the last uri"));
        }

        if master.variants.is_empty() {
            Ok(Playlist::Media(media))
        } else if media.segments.is_empty() {
            Ok(Playlist::Master(master))
        } else {
            Err(ParseError::new(0, "playlist mixes variant streams and segments"))
        }
    }
}

impl FromStr for Playlist {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Playlist::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::fs;

    #[tokio::test]
    async fn test_playlist_metadata() {
        let mut playlist = MediaPlaylist::new(6);
        playlist.playlist_type = Some(PlaylistType::Vod);
        playlist.key = Some(EncryptionKey::aes128("/tmp/key123.key", "0x0123456789abcdef"));
        playlist.add_segment(6.0, "out0000.ts".to_string());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_playlist.m3u8");

        playlist.write_to(&path).await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();

        assert!(content.starts_with("#EXTM3U\n"));
        assert!(content.contains("#EXT-X-VERSION:3"));
        assert!(content.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(content.contains("#EXT-X-TARGETDURATION:6"));
        assert!(content
            .contains("#EXT-X-KEY:METHOD=AES-128,URI=\"/tmp/key123.key\",IV=0x0123456789abcdef"));
        assert!(content.contains("#EXTINF:6.000000,\nout0000.ts\n"));
        assert!(content.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_parse_media_playlist() {
        let text = "#EXTM3U\n\
                    #EXT-X-VERSION:3\n\
                    #EXT-X-TARGETDURATION:6.0\n\
                    #EXT-X-PLAYLIST-TYPE:VOD\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"https://keys/k1\",IV=0xabc\n\
                    #EXTINF:6.000,\n\
                    out0000.ts\n\
                    #EXTINF:4.5,tail\n\
                    out0001.ts\n\
                    #EXT-X-ENDLIST\n";

        let Playlist::Media(media) = Playlist::parse(text).unwrap() else {
            panic!("expected media playlist");
        };
        assert_eq!(media.version, 3);
        assert_eq!(media.target_duration, 6);
        assert_eq!(media.playlist_type, Some(PlaylistType::Vod));
        assert_eq!(
            media.key,
            Some(EncryptionKey::aes128("https://keys/k1", "0xabc"))
        );
        assert_eq!(media.segments.len(), 2);
        assert_eq!(media.segments[1].duration, 4.5);
        assert_eq!(media.segments[1].uri, "out0001.ts");
        assert!(media.end_list);
    }

    #[test]
    fn test_parse_master_playlist() {
        let text = "#EXTM3U\n\
                    #EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720,CODECS=\"avc1.4d401f,mp4a.40.2\"\n\
                    ./720p/720p.m3u8\n";

        let Playlist::Master(master) = text.parse().unwrap() else {
            panic!("expected master playlist");
        };
        assert_eq!(
            master.variants,
            vec![VariantStream {
                bandwidth: 2_800_000,
                resolution: Some(Resolution {
                    width: 1280,
                    height: 720
                }),
                uri: "./720p/720p.m3u8".to_string(),
            }]
        );
    }

    #[test]
    fn test_render_then_parse_is_stable() {
        let mut playlist = MediaPlaylist::new(6);
        playlist.playlist_type = Some(PlaylistType::Vod);
        playlist.add_segment(5.96, "out0000.ts".to_string());
        let rendered = playlist.to_string();

        let Playlist::Media(parsed) = Playlist::parse(&rendered).unwrap() else {
            panic!("expected media playlist");
        };
        assert_eq!(parsed.to_string(), rendered);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Playlist::parse("").unwrap_err().line, 0);
        assert_eq!(Playlist::parse("out0000.ts\n").unwrap_err().line, 1);
        assert!(Playlist::parse("#EXTM3U\nout0000.ts\n").is_err());
        assert!(Playlist::parse("#EXTM3U\n#EXTINF:abc,\nout0000.ts\n").is_err());
        assert!(Playlist::parse("#EXTM3U\n#EXT-X-STREAM-INF:RESOLUTION=1x1\na.m3u8\n").is_err());
        assert!(Playlist::parse("#EXTM3U\n#EXTINF:6,\n").is_err());
    }

    #[test]
    fn test_master_render() {
        let master = MasterPlaylist {
            variants: vec![VariantStream {
                bandwidth: 800_000,
                resolution: Some(Resolution {
                    width: 640,
                    height: 360,
                }),
                uri: "./360p/360p.m3u8".to_string(),
            }],
        };
        assert_eq!(
            master.to_string(),
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n./360p/360p.m3u8\n"
        );
    }
}
