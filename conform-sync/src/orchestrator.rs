//! The sync state machine.
//!
//! ```text
//! Start → ManifestFetching → Verifying → [Fetching] → AuxiliaryAssets → Done
//!                  ↓                  (any pass) ↓
//!               Failed                       Cancelled
//! ```
//!
//! Files are processed one at a time in manifest order. Only a manifest
//! failure aborts a run; every per-file problem lands in the
//! [`SyncReport`]. Byte accounting goes through a [`ProgressLedger`], so an
//! entry's size is counted at most once whichever way it was satisfied.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use conform_core::config::DEFAULT_CHUNK_SIZE;
use conform_core::{AuxiliaryAsset, Config, ContentHash, Manifest, ManifestEntry, RelPath};

use crate::cancel::CancelToken;
use crate::donor::{DonorLocator, LocalSourceResolver, NoDonor};
use crate::download::{object_url, Downloader};
use crate::error::{fs_failure, DownloadError, FailureReason, SyncError};
use crate::events::{AcquireSource, SyncEvent, SyncObserver, SyncState};
use crate::manifest::fetch_manifest;
use crate::progress::ProgressLedger;
use crate::retry::RetryPolicy;
use crate::scanner::{verify_file, InvalidReason, LocalStateScanner, Verification};
use crate::transport::Transport;
use crate::writer::{CommitError, StagedFile};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub manifest_url: String,
    /// Object URLs are this plus the entry's relative path.
    pub download_base_url: String,
    pub destination: PathBuf,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    pub auxiliary: Vec<AuxiliaryAsset>,
}

impl SyncOptions {
    pub fn new(
        manifest_url: impl Into<String>,
        download_base_url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            download_base_url: download_base_url.into(),
            destination: destination.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            auxiliary: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            manifest_url: config.manifest_url.clone(),
            download_base_url: config.download_base_url.clone(),
            destination: config.destination.clone(),
            chunk_size: config.chunk_size.max(1),
            retry: RetryPolicy::from(&config.retry),
            auxiliary: config.auxiliary.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of checking one entry against the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTask {
    Satisfied,
    NeedsFetch {
        entry: ManifestEntry,
        reason: InvalidReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DownloadFailed,
    Corrupt,
    Filesystem,
    Cancelled,
}

impl From<&FailureReason> for FailureKind {
    fn from(reason: &FailureReason) -> Self {
        match reason {
            FailureReason::DownloadFailed(_) => FailureKind::DownloadFailed,
            FailureReason::Corrupt { .. } => FailureKind::Corrupt,
            FailureReason::Filesystem { .. } => FailureKind::Filesystem,
            FailureReason::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// A file left out of conformance at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: RelPath,
    pub kind: FailureKind,
    pub reason: String,
}

impl FileFailure {
    fn new(path: RelPath, reason: &FailureReason) -> Self {
        Self {
            path,
            kind: FailureKind::from(reason),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub manifest_files: usize,
    pub already_valid: usize,
    pub from_donor: usize,
    pub downloaded: usize,
    pub auxiliary_fetched: usize,
    pub failures: Vec<FileFailure>,
    pub processed_bytes: u64,
    pub total_bytes: u64,
    /// Object GET requests issued, retries included.
    pub network_downloads: usize,
    pub cancelled: bool,
}

impl SyncReport {
    /// Manifest entries that ended the run valid.
    pub fn succeeded_count(&self) -> usize {
        self.already_valid + self.from_donor + self.downloaded
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }
}

/// An entry that would be fetched by a full sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingFile {
    pub path: RelPath,
    pub size: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub manifest_files: usize,
    pub valid: usize,
    pub valid_bytes: u64,
    pub total_bytes: u64,
    pub needs_fetch: Vec<PendingFile>,
    pub cancelled: bool,
}

impl VerifyReport {
    pub fn is_conformant(&self) -> bool {
        !self.cancelled && self.needs_fetch.is_empty()
    }
}

#[derive(Default)]
struct VerificationPass {
    valid: usize,
    needs_fetch: Vec<(ManifestEntry, InvalidReason)>,
    /// Never checked because the run was cancelled.
    unchecked: Vec<ManifestEntry>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator {
    options: SyncOptions,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn SyncObserver + Send + Sync>,
    donor: Box<dyn DonorLocator + Send + Sync>,
    cancel: CancelToken,
    requests: AtomicUsize,
}

impl SyncOrchestrator {
    pub fn new(
        options: SyncOptions,
        transport: Arc<dyn Transport>,
        observer: impl SyncObserver + Send + Sync + 'static,
    ) -> Self {
        Self {
            options,
            transport,
            observer: Arc::new(observer),
            donor: Box::new(NoDonor),
            cancel: CancelToken::new(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_donor(mut self, locator: impl DonorLocator + Send + Sync + 'static) -> Self {
        self.donor = Box::new(locator);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the whole state machine once.
    pub fn run(&self) -> Result<SyncReport, SyncError> {
        let span = tracing::info_span!("sync", manifest = %self.options.manifest_url);
        let _enter = span.enter();
        let requests_before = self.requests.load(Ordering::Relaxed);

        let manifest = self.load_manifest()?;
        let mut ledger = ProgressLedger::new(manifest.total_size());
        let mut report = SyncReport {
            manifest_files: manifest.entries().len(),
            total_bytes: manifest.total_size(),
            ..SyncReport::default()
        };

        self.enter(SyncState::Verifying);
        let pass = self.verification_pass(&manifest, &mut ledger);
        report.already_valid = pass.valid;
        tracing::info!(
            valid = pass.valid,
            needs_fetch = pass.needs_fetch.len(),
            "verification finished"
        );

        if !pass.unchecked.is_empty() {
            let pending = pass.needs_fetch.iter().map(|(entry, _)| &entry.path);
            let unchecked = pass.unchecked.iter().map(|entry| &entry.path);
            self.record_cancelled(&mut report, pending.chain(unchecked));
            return Ok(self.finish(report, &ledger, requests_before));
        }

        if !pass.needs_fetch.is_empty() {
            self.enter(SyncState::Fetching);
            let donor_root = self.resolve_donor();
            let entries: Vec<&ManifestEntry> = pass.needs_fetch.iter().map(|(e, _)| e).collect();
            self.fetch_pass(&entries, donor_root.as_deref(), &mut ledger, &mut report);
            if report.cancelled {
                return Ok(self.finish(report, &ledger, requests_before));
            }
        }

        self.enter(SyncState::AuxiliaryAssets);
        self.auxiliary_pass(&mut report);
        Ok(self.finish(report, &ledger, requests_before))
    }

    /// Fetch the manifest and check the destination without writing anything.
    pub fn verify_only(&self) -> Result<VerifyReport, SyncError> {
        let span = tracing::info_span!("verify", manifest = %self.options.manifest_url);
        let _enter = span.enter();

        let manifest = self.load_manifest()?;
        let mut ledger = ProgressLedger::new(manifest.total_size());
        self.enter(SyncState::Verifying);
        let pass = self.verification_pass(&manifest, &mut ledger);

        let report = VerifyReport {
            manifest_files: manifest.entries().len(),
            valid: pass.valid,
            valid_bytes: ledger.processed(),
            total_bytes: manifest.total_size(),
            needs_fetch: pass
                .needs_fetch
                .into_iter()
                .map(|(entry, reason)| PendingFile {
                    path: entry.path,
                    size: entry.size,
                    reason: reason.to_string(),
                })
                .collect(),
            cancelled: !pass.unchecked.is_empty(),
        };
        self.enter(if report.cancelled {
            SyncState::Cancelled
        } else {
            SyncState::Done
        });
        Ok(report)
    }

    /// Check one entry against the destination.
    pub fn check(&self, entry: &ManifestEntry) -> SyncTask {
        let scanner = LocalStateScanner::new(&self.options.destination, self.options.chunk_size);
        match scanner.verify(entry) {
            Verification::Valid => SyncTask::Satisfied,
            Verification::Invalid(reason) => {
                tracing::debug!(path = %entry.path, %reason, "needs fetch");
                SyncTask::NeedsFetch {
                    entry: entry.clone(),
                    reason,
                }
            }
        }
    }

    /// Bring one entry into place: donor copy first, then the network.
    ///
    /// `on_progress` receives the bytes read so far of the current network
    /// attempt; it restarts from 0 on a retry. Byte accounting is left to
    /// the caller.
    pub fn acquire(
        &self,
        entry: &ManifestEntry,
        donor_root: Option<&Path>,
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<AcquireSource, FailureReason> {
        if let Some(root) = donor_root {
            let resolver = LocalSourceResolver::new(root, self.options.chunk_size);
            if resolver
                .try_acquire_locally(entry, &self.options.destination)
                .is_copied()
            {
                return Ok(AcquireSource::Donor);
            }
        }

        let url = object_url(&self.options.download_base_url, &entry.path);
        let dest = entry.path.join_to(&self.options.destination);
        let bytes = self.download_to(
            &url,
            &dest,
            Some(entry.size),
            Some(&entry.hash),
            entry.path.as_str(),
            on_progress,
        )?;
        tracing::info!(path = %entry.path, bytes, "downloaded");
        Ok(AcquireSource::Network)
    }

    // -- passes -------------------------------------------------------------

    fn load_manifest(&self) -> Result<Manifest, SyncError> {
        self.enter(SyncState::Start);
        self.enter(SyncState::ManifestFetching);
        match fetch_manifest(self.transport.as_ref(), &self.options.manifest_url) {
            Ok(manifest) => {
                self.observer.notify(&SyncEvent::ManifestLoaded {
                    files: manifest.entries().len(),
                    total_bytes: manifest.total_size(),
                });
                Ok(manifest)
            }
            Err(err) => {
                tracing::error!(error = %err, "manifest fetch failed");
                self.enter(SyncState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    fn verification_pass(&self, manifest: &Manifest, ledger: &mut ProgressLedger) -> VerificationPass {
        let mut pass = VerificationPass::default();
        for (index, entry) in manifest.entries().iter().enumerate() {
            if self.cancel.is_cancelled() {
                pass.unchecked = manifest.entries()[index..].to_vec();
                break;
            }
            self.observer.notify(&SyncEvent::Checking {
                path: entry.path.clone(),
            });
            match self.check(entry) {
                SyncTask::Satisfied => {
                    ledger.confirm(entry);
                    pass.valid += 1;
                    self.observer.notify(&SyncEvent::Progress(ledger.snapshot(0)));
                }
                SyncTask::NeedsFetch { entry, reason } => pass.needs_fetch.push((entry, reason)),
            }
        }
        pass
    }

    fn fetch_pass(
        &self,
        entries: &[&ManifestEntry],
        donor_root: Option<&Path>,
        ledger: &mut ProgressLedger,
        report: &mut SyncReport,
    ) {
        for (index, entry) in entries.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.record_cancelled(report, entries[index..].iter().map(|e| &e.path));
                return;
            }

            let result = {
                let observer = &self.observer;
                let confirmed = &*ledger;
                let mut on_progress = |in_flight: u64| {
                    observer.notify(&SyncEvent::Progress(confirmed.snapshot(in_flight)));
                };
                self.acquire(entry, donor_root, &mut on_progress)
            };

            match result {
                Ok(source) => {
                    ledger.confirm(entry);
                    match source {
                        AcquireSource::Donor => report.from_donor += 1,
                        AcquireSource::Network => report.downloaded += 1,
                    }
                    self.observer.notify(&SyncEvent::Acquired {
                        path: entry.path.clone(),
                        source,
                    });
                }
                Err(FailureReason::Cancelled) => {
                    self.record_cancelled(report, entries[index..].iter().map(|e| &e.path));
                    return;
                }
                Err(reason) => self.record_failure(report, &entry.path, reason),
            }
            self.observer.notify(&SyncEvent::Progress(ledger.snapshot(0)));
        }
    }

    /// Assets pinned by size and hash are only fetched when the local copy
    /// fails verification. Unpinned assets are fetched every run.
    fn auxiliary_pass(&self, report: &mut SyncReport) {
        for (index, asset) in self.options.auxiliary.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let rest = self.options.auxiliary[index..].iter().map(|a| &a.path);
                self.record_cancelled(report, rest);
                return;
            }

            let dest = asset.path.join_to(&self.options.destination);
            if let Some((size, hash)) = asset.expected() {
                if verify_file(&dest, size, hash, self.options.chunk_size).is_valid() {
                    tracing::debug!(path = %asset.path, "auxiliary asset up to date");
                    continue;
                }
            }

            match self.download_to(
                &asset.url,
                &dest,
                asset.size,
                asset.hash.as_ref(),
                asset.path.as_str(),
                &mut |_| {},
            ) {
                Ok(bytes) => {
                    tracing::info!(path = %asset.path, bytes, "auxiliary asset fetched");
                    report.auxiliary_fetched += 1;
                    self.observer.notify(&SyncEvent::AuxiliaryFetched {
                        path: asset.path.clone(),
                    });
                }
                Err(FailureReason::Cancelled) => {
                    let rest = self.options.auxiliary[index..].iter().map(|a| &a.path);
                    self.record_cancelled(report, rest);
                    return;
                }
                Err(reason) => self.record_failure(report, &asset.path, reason),
            }
        }
    }

    // -- helpers ------------------------------------------------------------

    /// Stream `url` into `dest` through a staged file, retrying transient
    /// failures. Returns the number of bytes placed.
    fn download_to(
        &self,
        url: &str,
        dest: &Path,
        expected_size: Option<u64>,
        expected_hash: Option<&ContentHash>,
        label: &str,
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<u64, FailureReason> {
        let downloader = Downloader::new(self.transport.as_ref(), self.options.chunk_size);
        let fetched = self.options.retry.run(label, &self.cancel, |attempt| {
            if attempt > 1 {
                on_progress(0);
            }
            let mut staged = StagedFile::create(dest).map_err(DownloadError::Sink)?;
            self.requests.fetch_add(1, Ordering::Relaxed);
            let received =
                downloader.fetch_into(url, expected_size, &mut staged, &self.cancel, &mut *on_progress)?;
            Ok((staged, received))
        });

        let (staged, received) = fetched.map_err(|err| match err {
            DownloadError::Sink(source) => fs_failure(dest, source),
            DownloadError::Cancelled => FailureReason::Cancelled,
            other => FailureReason::DownloadFailed(other),
        })?;

        match staged.commit(expected_hash) {
            Ok(_) => Ok(received),
            Err(CommitError::HashMismatch { expected, actual }) => {
                Err(FailureReason::Corrupt { expected, actual })
            }
            Err(CommitError::Io { path, source }) => Err(fs_failure(path, source)),
        }
    }

    /// The donor root to use for this run, if any.
    fn resolve_donor(&self) -> Option<PathBuf> {
        let root = self.donor.resolve_donor_root()?;
        if !root.is_dir() {
            tracing::info!(donor = %root.display(), "donor root not present, skipping");
            return None;
        }
        if same_directory(&root, &self.options.destination) {
            tracing::warn!(donor = %root.display(), "donor root is the destination, ignoring");
            return None;
        }
        tracing::info!(donor = %root.display(), "using donor installation");
        Some(root)
    }

    fn record_failure(&self, report: &mut SyncReport, path: &RelPath, reason: FailureReason) {
        tracing::warn!(path = %path, error = %reason, "file not synced");
        self.observer.notify(&SyncEvent::FileFailed {
            path: path.clone(),
            reason: reason.to_string(),
        });
        report.failures.push(FileFailure::new(path.clone(), &reason));
    }

    fn record_cancelled<'p>(
        &self,
        report: &mut SyncReport,
        remaining: impl Iterator<Item = &'p RelPath>,
    ) {
        let before = report.failures.len();
        report
            .failures
            .extend(remaining.map(|path| FileFailure::new(path.clone(), &FailureReason::Cancelled)));
        report.cancelled = true;
        tracing::info!(skipped = report.failures.len() - before, "sync cancelled");
    }

    fn finish(&self, mut report: SyncReport, ledger: &ProgressLedger, requests_before: usize) -> SyncReport {
        report.processed_bytes = ledger.processed();
        report.network_downloads = self
            .requests
            .load(Ordering::Relaxed)
            .saturating_sub(requests_before);

        if report.cancelled {
            self.enter(SyncState::Cancelled);
        } else {
            tracing::info!(
                valid = report.already_valid,
                donor = report.from_donor,
                downloaded = report.downloaded,
                auxiliary = report.auxiliary_fetched,
                failed = report.failures.len(),
                "sync finished"
            );
            self.enter(SyncState::Done);
        }
        report
    }

    fn enter(&self, state: SyncState) {
        tracing::debug!(%state, "state change");
        self.observer.notify(&SyncEvent::StateChanged(state));
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
