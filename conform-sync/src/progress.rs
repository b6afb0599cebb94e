//! Byte accounting for a sync run.
//!
//! `processed_bytes` only moves when a whole entry is confirmed, and each
//! entry path can be confirmed once. In-flight download bytes live beside the
//! ledger in [`ProgressSnapshot`] and are never folded into it.

use std::collections::HashSet;

use serde::Serialize;

use conform_core::{percentage, ManifestEntry, RelPath};

#[derive(Debug, Default)]
pub struct ProgressLedger {
    processed: u64,
    total: u64,
    confirmed: HashSet<RelPath>,
}

impl ProgressLedger {
    pub fn new(total: u64) -> Self {
        Self {
            processed: 0,
            total,
            confirmed: HashSet::new(),
        }
    }

    /// Count `entry` as done. Returns `false` if it was already counted.
    pub fn confirm(&mut self, entry: &ManifestEntry) -> bool {
        if !self.confirmed.insert(entry.path.clone()) {
            return false;
        }
        self.processed = self.processed.saturating_add(entry.size);
        true
    }

    pub fn is_confirmed(&self, path: &RelPath) -> bool {
        self.confirmed.contains(path)
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn snapshot(&self, in_flight_bytes: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            processed_bytes: self.processed,
            in_flight_bytes,
            total_bytes: self.total,
        }
    }
}

/// What a progress display should show at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressSnapshot {
    pub processed_bytes: u64,
    /// Bytes read so far for the file currently being transferred.
    pub in_flight_bytes: u64,
    pub total_bytes: u64,
}

impl ProgressSnapshot {
    pub fn displayed_bytes(&self) -> u64 {
        self.processed_bytes.saturating_add(self.in_flight_bytes)
    }

    pub fn percentage(&self) -> f64 {
        percentage(self.displayed_bytes(), self.total_bytes)
    }
}
