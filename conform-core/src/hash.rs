//! Streaming XXH64 content hashing.
//!
//! The digest encoding (seed 0, 16 lower-case hex chars) is shared with the
//! manifest producer and must not change.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use xxhash_rust::xxh64::Xxh64;

use crate::types::ContentHash;

/// Read size used when hashing files.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

const SEED: u64 = 0;

/// Incremental hasher fed with successive byte ranges of one file.
pub struct HashStream {
    state: Xxh64,
    bytes: u64,
}

impl HashStream {
    pub fn new() -> Self {
        Self {
            state: Xxh64::new(SEED),
            bytes: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.state.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes fed so far.
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash::from_u64(self.state.digest())
    }
}

impl Default for HashStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash everything `reader` yields, `chunk_size` bytes at a time.
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<ContentHash> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut stream = HashStream::new();
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        stream.update(&buf[..n]);
    }
    Ok(stream.finalize())
}

pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    hash_reader(File::open(path)?, HASH_CHUNK_SIZE)
}

pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let mut stream = HashStream::new();
    stream.update(bytes);
    stream.finalize()
}
