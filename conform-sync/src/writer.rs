//! Atomic placement of files into the installation.
//!
//! ## Staging protocol
//!
//! 1. Create parent directories of the destination.
//! 2. Stream bytes into `<dest>.conform.tmp`, hashing as they pass.
//! 3. Flush and fsync the temp file.
//! 4. Compare the streamed hash with the expected one → discard on mismatch.
//! 5. Rename the temp file over the destination.
//!
//! A crash at any step leaves either the old file or a stray `.tmp`, never a
//! destination with the right size and the wrong bytes. A [`StagedFile`]
//! that is dropped without [`StagedFile::commit`] removes its temp file.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use conform_core::{ContentHash, HashStream};

/// Suffix appended to the destination file name while staging.
pub const TMP_SUFFIX: &str = ".conform.tmp";

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("staged content hashed to {actual}, expected {expected}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// `<dest>.conform.tmp`, in the same directory as `dest`.
pub fn tmp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("unnamed"));
    name.push(TMP_SUFFIX);
    dest.with_file_name(name)
}

/// A destination file being written through its temp sibling.
pub struct StagedFile {
    dest: PathBuf,
    tmp: PathBuf,
    writer: Option<BufWriter<File>>,
    hasher: HashStream,
}

impl StagedFile {
    /// Create (or truncate) the temp file for `dest`.
    pub fn create(dest: &Path) -> io::Result<Self> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path_for(dest);
        let file = File::create(&tmp)?;
        Ok(Self {
            dest: dest.to_path_buf(),
            tmp,
            writer: Some(BufWriter::new(file)),
            hasher: HashStream::new(),
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.hasher.len()
    }

    /// Finish the file and move it into place.
    ///
    /// With `expected` set, the file only lands if the streamed bytes hash to
    /// it. Returns the hash of what was written.
    pub fn commit(mut self, expected: Option<&ContentHash>) -> Result<ContentHash, CommitError> {
        let Some(writer) = self.writer.take() else {
            return Err(self.io_error(&self.tmp, io::Error::other("staged file already closed")));
        };
        let file = writer
            .into_inner()
            .map_err(|e| self.io_error(&self.tmp, e.into_error()))?;
        file.sync_all().map_err(|e| self.io_error(&self.tmp, e))?;
        drop(file);

        let hasher = std::mem::take(&mut self.hasher);
        let actual = hasher.finalize();
        if let Some(expected) = expected {
            if *expected != actual {
                return Err(CommitError::HashMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        fs::rename(&self.tmp, &self.dest).map_err(|e| self.io_error(&self.dest, e))?;
        tracing::debug!(path = %self.dest.display(), "placed file");
        Ok(actual)
    }

    fn io_error(&self, path: &Path, source: io::Error) -> CommitError {
        CommitError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already closed"))?;
        let n = writer.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        // No-op after a successful rename.
        self.writer.take();
        let _ = fs::remove_file(&self.tmp);
    }
}

/// Copy `src` to `dest` through a staged temp file.
pub fn copy_staged(
    src: &Path,
    dest: &Path,
    expected: Option<&ContentHash>,
    chunk_size: usize,
) -> Result<ContentHash, CommitError> {
    let io_at = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CommitError::Io { path, source }
    };
    let mut input = File::open(src).map_err(io_at(src))?;
    let mut staged = StagedFile::create(dest).map_err(io_at(dest))?;
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_at(src)(e)),
        };
        staged.write_all(&buf[..n]).map_err(io_at(dest))?;
    }
    staged.commit(expected)
}

/// Write a complete buffer to `dest` through a staged temp file.
pub fn write_staged(
    dest: &Path,
    bytes: &[u8],
    expected: Option<&ContentHash>,
) -> Result<ContentHash, CommitError> {
    let mut staged = StagedFile::create(dest).map_err(|source| CommitError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    staged.write_all(bytes).map_err(|source| CommitError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    staged.commit(expected)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
