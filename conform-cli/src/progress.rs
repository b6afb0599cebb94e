//! Terminal progress for `conform sync`.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use conform_core::format_bytes;
use conform_sync::{ProgressSnapshot, SyncEvent, SyncObserver, SyncState};

const TEMPLATE: &str = "{spinner:.green} {prefix:>12.bold} [{bar:30.cyan/dim}] {msg}";

/// Byte progress bar driven by [`SyncEvent`]s.
#[derive(Clone)]
pub struct SyncProgressBar {
    bar: ProgressBar,
}

impl SyncProgressBar {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Draws nothing. Used for `--json`.
    pub fn hidden() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn show(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_length(snapshot.total_bytes);
        self.bar
            .set_position(snapshot.displayed_bytes().min(snapshot.total_bytes));
        self.bar.set_message(progress_message(snapshot));
    }
}

impl SyncObserver for SyncProgressBar {
    fn notify(&self, event: &SyncEvent) {
        match event {
            SyncEvent::StateChanged(state) => self.bar.set_prefix(state_label(state)),
            SyncEvent::ManifestLoaded { total_bytes, .. } => self.bar.set_length(*total_bytes),
            SyncEvent::Progress(snapshot) => self.show(snapshot),
            SyncEvent::FileFailed { path, reason } => {
                self.bar.println(format!("  failed {path}: {reason}"));
            }
            SyncEvent::Checking { .. }
            | SyncEvent::Acquired { .. }
            | SyncEvent::AuxiliaryFetched { .. } => {}
        }
    }
}

/// `42.5%  1.2 MB / 2.8 MB`
pub fn progress_message(snapshot: &ProgressSnapshot) -> String {
    format!(
        "{:5.1}%  {} / {}",
        snapshot.percentage(),
        format_bytes(snapshot.displayed_bytes()),
        format_bytes(snapshot.total_bytes)
    )
}

fn state_label(state: &SyncState) -> &'static str {
    match state {
        SyncState::Start | SyncState::ManifestFetching => "Manifest",
        SyncState::Verifying => "Verifying",
        SyncState::Fetching => "Fetching",
        SyncState::AuxiliaryAssets => "Extras",
        SyncState::Done => "Done",
        SyncState::Cancelled => "Cancelled",
        SyncState::Failed(_) => "Failed",
    }
}
