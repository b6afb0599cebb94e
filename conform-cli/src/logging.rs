//! Tracing setup for the `conform` binary.
//!
//! Two sinks: stderr (warnings by default, everything `RUST_LOG` allows with
//! `--verbose`) and an append-only `conform.log` in the destination, which
//! always records at `RUST_LOG` or `info`.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::log_rotation::{rotate_if_needed, MAX_LOG_BYTES, MAX_ROTATED_FILES};

pub const LOG_FILE_NAME: &str = "conform.log";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. With `log_dir`, also log to
/// `<log_dir>/conform.log`, rotating it first if it has grown too large.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(if verbose {
            env_filter("info")
        } else {
            EnvFilter::new("warn")
        });

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let path = dir.join(LOG_FILE_NAME);
            if let Err(err) = rotate_if_needed(&path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
                eprintln!("warning: log rotation failed for {}: {err}", path.display());
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(env_filter("info")),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        started = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "conform started"
    );
    Ok(())
}
