//! Conform core library — manifest types, content hashing, progress math,
//! configuration.
//!
//! - [`types`] — [`RelPath`], [`ContentHash`], [`Manifest`]
//! - [`hash`] — streaming XXH64 ([`HashStream`])
//! - [`progress`] — [`percentage`] and [`format_bytes`]
//! - [`config`] — YAML load / save
//! - [`error`] — error enums

pub mod config;
pub mod error;
pub mod hash;
pub mod progress;
pub mod types;

pub use config::{AuxiliaryAsset, Config, RetrySettings, TimeoutSettings};
pub use error::{ConfigError, ManifestError, PathError};
pub use hash::{hash_bytes, hash_file, hash_reader, HashStream, HASH_CHUNK_SIZE};
pub use progress::{format_bytes, percentage};
pub use types::{ContentHash, Manifest, ManifestEntry, RelPath};
