//! Domain types for manifests.
//!
//! Manifest paths are untrusted input. They only ever reach the filesystem
//! through [`RelPath`], which refuses absolute paths and `..` segments.

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ManifestError, PathError};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A normalized, slash-separated path relative to an installation root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

impl RelPath {
    /// Parse and normalize an untrusted relative path.
    ///
    /// `\` is treated as a separator, empty and `.` segments are dropped.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') || has_drive_prefix(&unified) {
            return Err(PathError::Absolute(raw.to_owned()));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathError::ParentTraversal(raw.to_owned())),
                other if !is_plain_segment(other) => {
                    return Err(PathError::Segment {
                        path: raw.to_owned(),
                        segment: other.to_owned(),
                    })
                }
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Resolve against `root`, one component per segment.
    pub fn join_to(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for segment in self.segments() {
            out.push(segment);
        }
        out
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// A segment must push as exactly one normal component on every platform.
/// `:` is refused outright: on Windows it starts a drive prefix or an
/// alternate data stream.
fn is_plain_segment(segment: &str) -> bool {
    if segment.contains(':') {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for RelPath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RelPath> for String {
    fn from(p: RelPath) -> Self {
        p.0
    }
}

/// XXH64 digest rendered as 16 lower-case hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

/// Width of the hex rendering of a [`ContentHash`].
pub const CONTENT_HASH_HEX_LEN: usize = 16;

impl ContentHash {
    /// Accepts 16 hex digits in either case; stores lower-case.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != CONTENT_HASH_HEX_LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(raw.to_ascii_lowercase()))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(format!("{value:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("expected {CONTENT_HASH_HEX_LEN} hex digits, got {s:?}"))
    }
}

impl From<ContentHash> for String {
    fn from(h: ContentHash) -> Self {
        h.0
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One expected file: where it lives, how long it is, what it hashes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: RelPath,
    pub size: u64,
    pub hash: ContentHash,
}

/// The desired file set for an installation. Read-only once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    scanned_folder: Option<String>,
    declared_files: u64,
    declared_size: u64,
    total_size: u64,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct WireManifest {
    #[serde(default)]
    scanned_folder: Option<String>,
    #[serde(default)]
    total_files: u64,
    #[serde(default)]
    total_size: u64,
    files: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    path: String,
    size: u64,
    #[serde(alias = "hash")]
    xxhash: String,
}

impl Manifest {
    /// Parse a manifest document, validating every entry.
    ///
    /// Any bad entry rejects the whole document.
    pub fn from_json(document: &str) -> Result<Self, ManifestError> {
        let wire: WireManifest = serde_json::from_str(document)?;
        let mut seen = HashSet::with_capacity(wire.files.len());
        let mut entries = Vec::with_capacity(wire.files.len());
        let mut total_size = 0u64;

        for (index, raw) in wire.files.into_iter().enumerate() {
            let path = RelPath::parse(&raw.path)
                .map_err(|source| ManifestError::InvalidPath { index, source })?;
            let hash = ContentHash::parse(&raw.xxhash).ok_or_else(|| ManifestError::InvalidHash {
                path: path.to_string(),
                value: raw.xxhash.clone(),
            })?;
            if !seen.insert(path.clone()) {
                return Err(ManifestError::DuplicatePath(path.to_string()));
            }
            total_size = total_size
                .checked_add(raw.size)
                .ok_or(ManifestError::SizeOverflow { index })?;
            entries.push(ManifestEntry {
                path,
                size: raw.size,
                hash,
            });
        }

        Ok(Self {
            scanned_folder: wire.scanned_folder,
            declared_files: wire.total_files,
            declared_size: wire.total_size,
            total_size,
            entries,
        })
    }

    /// Entries in document order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn scanned_folder(&self) -> Option<&str> {
        self.scanned_folder.as_deref()
    }

    /// `total_files` as stated by the producer. Informational only.
    pub fn declared_files(&self) -> u64 {
        self.declared_files
    }

    /// `total_size` as stated by the producer. Informational only.
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Sum of entry sizes, recomputed.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// True when the declared totals agree with the entries.
    pub fn totals_consistent(&self) -> bool {
        self.declared_files == self.entries.len() as u64 && self.declared_size == self.total_size()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef";

    #[test]
    fn rel_path_normalizes_separators_and_dots() {
        let p = RelPath::parse(r"BepInEx\plugins\./Lethe.dll").unwrap();
        assert_eq!(p.as_str(), "BepInEx/plugins/Lethe.dll");
        assert_eq!(p.segments().count(), 3);
    }

    #[test]
    fn rel_path_rejects_traversal_and_absolute() {
        assert!(matches!(
            RelPath::parse("data/../../etc/passwd"),
            Err(PathError::ParentTraversal(_))
        ));
        assert!(matches!(RelPath::parse("/etc/passwd"), Err(PathError::Absolute(_))));
        assert!(matches!(RelPath::parse(r"C:\Windows"), Err(PathError::Absolute(_))));
        assert!(matches!(RelPath::parse("./"), Err(PathError::Empty)));
        assert!(matches!(RelPath::parse(""), Err(PathError::Empty)));
    }

    #[test]
    fn rel_path_rejects_inner_drive_and_stream_segments() {
        for raw in ["plugins/C:/Windows/evil.dll", r"plugins\C:evil.dll", "a/file.txt:hidden"] {
            assert!(
                matches!(RelPath::parse(raw), Err(PathError::Segment { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn rel_path_join_stays_under_root() {
        let root = Path::new("/install");
        let p = RelPath::parse("a/b/c.bin").unwrap();
        assert_eq!(p.join_to(root), Path::new("/install/a/b/c.bin"));
    }

    #[test]
    fn content_hash_lowercases_and_checks_width() {
        assert_eq!(
            ContentHash::parse("0123456789ABCDEF").unwrap().as_str(),
            HASH
        );
        assert!(ContentHash::parse("123").is_none());
        assert!(ContentHash::parse("0123456789abcdeg").is_none());
        assert_eq!(ContentHash::from_u64(0xff).as_str(), "00000000000000ff");
    }

    #[test]
    fn manifest_parses_original_field_names() {
        let doc = format!(
            r#"{{"scanned_folder":"Limbus","total_files":1,"total_size":100,
                "files":[{{"path":"a.bin","size":100,"xxhash":"{HASH}"}}]}}"#
        );
        let m = Manifest::from_json(&doc).unwrap();
        assert_eq!(m.entries().len(), 1);
        assert_eq!(m.entries()[0].size, 100);
        assert_eq!(m.scanned_folder(), Some("Limbus"));
        assert!(m.totals_consistent());
    }

    #[test]
    fn manifest_accepts_hash_alias() {
        let doc = format!(r#"{{"files":[{{"path":"a","size":1,"hash":"{HASH}"}}]}}"#);
        let m = Manifest::from_json(&doc).unwrap();
        assert_eq!(m.entries()[0].hash.as_str(), HASH);
        assert!(!m.totals_consistent());
    }

    #[test]
    fn manifest_rejects_non_numeric_size() {
        let doc = format!(r#"{{"files":[{{"path":"a","size":"big","xxhash":"{HASH}"}}]}}"#);
        assert!(matches!(Manifest::from_json(&doc), Err(ManifestError::Json(_))));
    }

    #[test]
    fn manifest_rejects_missing_files_field() {
        assert!(matches!(
            Manifest::from_json(r#"{"total_files":0}"#),
            Err(ManifestError::Json(_))
        ));
    }

    #[test]
    fn manifest_rejects_empty_path() {
        let doc = format!(r#"{{"files":[{{"path":"","size":1,"xxhash":"{HASH}"}}]}}"#);
        assert!(matches!(
            Manifest::from_json(&doc),
            Err(ManifestError::InvalidPath { index: 0, source: PathError::Empty })
        ));
    }

    #[test]
    fn manifest_rejects_traversal_path() {
        let doc = format!(
            r#"{{"files":[{{"path":"ok.bin","size":1,"xxhash":"{HASH}"}},
                          {{"path":"../evil.bin","size":1,"xxhash":"{HASH}"}}]}}"#
        );
        assert!(matches!(
            Manifest::from_json(&doc),
            Err(ManifestError::InvalidPath { index: 1, .. })
        ));
    }

    #[test]
    fn manifest_rejects_duplicate_after_normalization() {
        let doc = format!(
            r#"{{"files":[{{"path":"a/b","size":1,"xxhash":"{HASH}"}},
                          {{"path":"a\\b","size":1,"xxhash":"{HASH}"}}]}}"#
        );
        assert!(matches!(
            Manifest::from_json(&doc),
            Err(ManifestError::DuplicatePath(p)) if p == "a/b"
        ));
    }

    #[test]
    fn manifest_rejects_bad_hash() {
        let doc = r#"{"files":[{"path":"a","size":1,"xxhash":"nothex"}]}"#;
        assert!(matches!(
            Manifest::from_json(doc),
            Err(ManifestError::InvalidHash { .. })
        ));
    }

    #[test]
    fn total_size_is_recomputed() {
        let doc = format!(
            r#"{{"total_size":1,"files":[{{"path":"a","size":10,"xxhash":"{HASH}"}},
                                         {{"path":"b","size":32,"xxhash":"{HASH}"}}]}}"#
        );
        let m = Manifest::from_json(&doc).unwrap();
        assert_eq!(m.declared_size(), 1);
        assert_eq!(m.total_size(), 42);
    }

    #[test]
    fn overflowing_sizes_are_rejected() {
        let half = 1u64 << 63;
        let doc = format!(
            r#"{{"files":[{{"path":"a","size":{half},"xxhash":"{HASH}"}},
                          {{"path":"b","size":{half},"xxhash":"{HASH}"}}]}}"#
        );
        assert!(matches!(
            Manifest::from_json(&doc),
            Err(ManifestError::SizeOverflow { index: 1 })
        ));
    }
}
