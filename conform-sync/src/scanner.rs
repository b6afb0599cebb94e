//! Size-then-hash verification of files on disk.
//!
//! Size is a metadata lookup; hashing reads the whole file. A wrong-sized
//! file is rejected without being read.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use conform_core::{ContentHash, HashStream, ManifestEntry};

/// Outcome of checking one file against its manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Invalid(InvalidReason),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReason {
    /// `actual` is `None` when there is no regular file at the path.
    #[error("size mismatch: expected {expected} bytes, found {}", describe_size(.actual))]
    SizeMismatch { expected: u64, actual: Option<u64> },

    #[error("hash mismatch: expected {expected}, found {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("unreadable: {0}")]
    Unreadable(String),
}

fn describe_size(actual: &Option<u64>) -> String {
    match actual {
        Some(n) => format!("{n} bytes"),
        None => "no file".to_string(),
    }
}

/// Checks manifest entries against files under one root.
#[derive(Debug, Clone)]
pub struct LocalStateScanner {
    root: PathBuf,
    chunk_size: usize,
}

impl LocalStateScanner {
    pub fn new(root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            root: root.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn verify(&self, entry: &ManifestEntry) -> Verification {
        verify_file(
            &entry.path.join_to(&self.root),
            entry.size,
            &entry.hash,
            self.chunk_size,
        )
    }
}

/// Two-stage check of the file at `path`.
pub fn verify_file(path: &Path, size: u64, hash: &ContentHash, chunk_size: usize) -> Verification {
    let actual_size = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    };
    if actual_size != Some(size) {
        return Verification::Invalid(InvalidReason::SizeMismatch {
            expected: size,
            actual: actual_size,
        });
    }

    match hash_path(path, chunk_size) {
        Ok(actual) if actual == *hash => Verification::Valid,
        Ok(actual) => Verification::Invalid(InvalidReason::HashMismatch {
            expected: hash.clone(),
            actual,
        }),
        Err(e) => Verification::Invalid(InvalidReason::Unreadable(e.to_string())),
    }
}

fn hash_path(path: &Path, chunk_size: usize) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; chunk_size];
    let mut stream = HashStream::new();
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => stream.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(stream.finalize())
}
