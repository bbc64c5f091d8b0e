//! Object key conventions shared by the encoder output, the validator and the
//! playlist generator.
//!
//! Source segments are stored as `<dir>/out<index>.ts`; the rendition copy of
//! that segment lives at `<dir>/<rendition>/<rendition>_<index>.ts`.

use regex::Regex;
use std::sync::OnceLock;

/// Filename prefix of segments written by the single-quality recorder.
pub const SOURCE_SEGMENT_PREFIX: &str = "out";

fn source_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^out\d+(\.[A-Za-z0-9]+)?$").expect("valid regex"))
}

/// Parent "directory" of a key, `""` for a top-level key.
pub fn parent(key: &str) -> &str {
    match key.rfind('/') {
        Some(pos) => &key[..pos],
        None => "",
    }
}

/// Last path component of a key.
pub fn file_name(key: &str) -> &str {
    match key.rfind('/') {
        Some(pos) => &key[pos + 1..],
        None => key,
    }
}

/// Join `dir` and a relative `path`, resolving `.` and `..` components.
pub fn resolve(dir: &str, path: &str) -> String {
    let joined = if dir.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", dir, path)
    };
    clean(&joined)
}

/// Lexically normalise a key: collapse repeated separators, drop `.` and
/// resolve `..` against the preceding component.
pub fn clean(key: &str) -> String {
    let absolute = key.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in key.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            _ => parts.push(part),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Numeric index of a source segment key: the filename without its extension
/// and without the leading `out`.
pub fn segment_index(source_key: &str) -> &str {
    let name = file_name(source_key);
    let stem = match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    };
    stem.strip_prefix(SOURCE_SEGMENT_PREFIX).unwrap_or(stem)
}

/// Key under which the `rendition` copy of `source_key` is stored.
pub fn rendition_segment_key(source_key: &str, rendition: &str) -> String {
    let dir = parent(source_key);
    let index = segment_index(source_key);
    if dir.is_empty() {
        format!("{}/{}_{}.ts", rendition, rendition, index)
    } else {
        format!("{}/{}/{}_{}.ts", dir, rendition, rendition, index)
    }
}

/// Whether `key` is a source segment stored directly under `dir`.
pub fn is_source_segment(dir: &str, key: &str) -> bool {
    let rest = if dir.is_empty() {
        key
    } else {
        match key.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) {
            Some(rest) => rest,
            None => return false,
        }
    };
    source_segment_re().is_match(rest)
}

/// Rewrite a source segment URI into its rendition counterpart by replacing
/// the first `out` of the filename with the rendition prefix.
pub fn rewrite_segment_uri(uri: &str, segment_prefix: &str) -> String {
    let split = uri.rfind('/').map(|pos| pos + 1).unwrap_or(0);
    let (dir, name) = uri.split_at(split);
    format!(
        "{}{}",
        dir,
        name.replacen(SOURCE_SEGMENT_PREFIX, segment_prefix, 1)
    )
}
