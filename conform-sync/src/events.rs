//! What a sync run tells its caller while it works.

use std::fmt;
use std::sync::mpsc::Sender;

use serde::Serialize;

use conform_core::RelPath;

use crate::progress::ProgressSnapshot;

/// Orchestrator states. A run moves forward through these and never returns
/// to an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncState {
    Start,
    ManifestFetching,
    Verifying,
    Fetching,
    AuxiliaryAssets,
    Done,
    Cancelled,
    Failed(String),
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Done | SyncState::Cancelled | SyncState::Failed(_))
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Start => f.write_str("start"),
            SyncState::ManifestFetching => f.write_str("fetching manifest"),
            SyncState::Verifying => f.write_str("verifying"),
            SyncState::Fetching => f.write_str("fetching"),
            SyncState::AuxiliaryAssets => f.write_str("auxiliary assets"),
            SyncState::Done => f.write_str("done"),
            SyncState::Cancelled => f.write_str("cancelled"),
            SyncState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Where the bytes of an acquired file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquireSource {
    Donor,
    Network,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StateChanged(SyncState),
    ManifestLoaded { files: usize, total_bytes: u64 },
    Checking { path: RelPath },
    Progress(ProgressSnapshot),
    Acquired { path: RelPath, source: AcquireSource },
    FileFailed { path: RelPath, reason: String },
    AuxiliaryFetched { path: RelPath },
}

/// Receives events in the order the run produces them, on the run's thread.
pub trait SyncObserver {
    fn notify(&self, event: &SyncEvent);
}

impl SyncObserver for () {
    fn notify(&self, _event: &SyncEvent) {}
}

impl SyncObserver for Sender<SyncEvent> {
    fn notify(&self, event: &SyncEvent) {
        // A dropped receiver just stops listening.
        let _ = self.send(event.clone());
    }
}

impl<F> SyncObserver for F
where
    F: Fn(&SyncEvent),
{
    fn notify(&self, event: &SyncEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_observer_forwards_events() {
        let (tx, rx) = mpsc::channel();
        tx.notify(&SyncEvent::StateChanged(SyncState::Verifying));
        assert_eq!(rx.recv().unwrap(), SyncEvent::StateChanged(SyncState::Verifying));
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel::<SyncEvent>();
        drop(rx);
        tx.notify(&SyncEvent::StateChanged(SyncState::Done));
    }

    #[test]
    fn terminal_states() {
        assert!(SyncState::Done.is_terminal());
        assert!(SyncState::Failed("x".into()).is_terminal());
        assert!(!SyncState::Fetching.is_terminal());
        assert_eq!(SyncState::Failed("boom".into()).to_string(), "failed: boom");
    }
}
