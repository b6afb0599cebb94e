pub mod init;
pub mod sync;
pub mod verify;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use conform_core::config::{self, Config};
use conform_sync::FailureKind;

/// Load the config at `path`, applying a `--destination` override.
fn load_config(path: &Path, destination: Option<PathBuf>) -> Result<Config> {
    let mut config =
        config::load_at(path).with_context(|| format!("failed to load {}", path.display()))?;
    if let Some(destination) = destination {
        config.destination = destination;
    }
    Ok(config)
}

fn kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::DownloadFailed => "download failed",
        FailureKind::Corrupt => "corrupt",
        FailureKind::Filesystem => "filesystem",
        FailureKind::Cancelled => "cancelled",
    }
}
