//! YAML configuration for a sync installation.
//!
//! ```yaml
//! manifest_url: https://files.example.com/manifest.json
//! download_base_url: https://files.example.com/download/
//! destination: .
//! auto_update: true
//! retry: { max_attempts: 4, base_delay_ms: 500, max_delay_ms: 8000 }
//! timeouts: { connect_secs: 10, read_secs: 30 }
//! auxiliary:
//!   - url: https://api.example.com/Plugin.dll
//!     path: BepInEx/plugins/Plugin.dll
//! ```
//!
//! Writes use the same `.tmp` + rename pattern as every other file the
//! engine places.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{ContentHash, RelPath};

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "conform.yaml";

/// Default read chunk for downloads and hashing (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub manifest_url: String,
    pub download_base_url: String,
    #[serde(default = "default_destination")]
    pub destination: PathBuf,
    /// Explicit donor installation; platform discovery is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_root: Option<PathBuf>,
    /// When `false`, `sync` leaves the installation untouched.
    #[serde(default = "default_true")]
    pub auto_update: bool,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auxiliary: Vec<AuxiliaryAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per download, first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub connect_secs: u64,
    pub read_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            read_secs: 30,
        }
    }
}

/// A companion file fetched from its own URL, outside the manifest.
///
/// With both `size` and `hash` set it is verified like a manifest entry;
/// otherwise it is re-downloaded on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryAsset {
    pub url: String,
    pub path: RelPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
}

impl AuxiliaryAsset {
    /// Size and hash when both are pinned.
    pub fn expected(&self) -> Option<(u64, &ContentHash)> {
        match (self.size, self.hash.as_ref()) {
            (Some(size), Some(hash)) => Some((size, hash)),
            _ => None,
        }
    }
}

fn default_destination() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Config {
    pub fn new(manifest_url: impl Into<String>, download_base_url: impl Into<String>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            download_base_url: download_base_url.into(),
            destination: default_destination(),
            donor_root: None,
            auto_update: true,
            retry: RetrySettings::default(),
            timeouts: TimeoutSettings::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            auxiliary: Vec::new(),
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("manifest_url", &self.manifest_url)?;
        check_url("download_base_url", &self.download_base_url)?;
        for asset in &self.auxiliary {
            check_url("auxiliary.url", &asset.url)?;
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "chunk_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!("expected an http(s) URL, got {url:?}"),
    })
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load and validate the config at `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
/// path) if malformed YAML.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Atomically save `config` to `path`.
///
/// Write flow: serialize → `<name>.tmp` sibling → `rename`.
pub fn save_at(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let yaml = serde_yaml::to_string(config)?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    path.with_file_name(format!("{name}.tmp"))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
