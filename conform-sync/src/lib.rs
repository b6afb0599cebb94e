//! # conform-sync
//!
//! Brings a directory tree into conformance with a remote manifest.
//!
//! Build a [`SyncOrchestrator`] from [`SyncOptions`] and a [`Transport`],
//! then call [`SyncOrchestrator::run`]. Files already valid on disk are left
//! alone, verified donor copies are preferred over the network, and every
//! placed file goes through a staged write that is hash-checked before the
//! rename.

pub mod cancel;
pub mod donor;
pub mod download;
pub mod error;
pub mod events;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod scanner;
pub mod transport;
pub mod writer;

pub use cancel::CancelToken;
pub use donor::{DonorLocator, DonorOutcome, LocalSourceResolver, MissReason, NoDonor};
pub use download::{object_url, Downloader};
pub use error::{DownloadError, FailureReason, ManifestFetchError, SyncError, TransportError};
pub use events::{AcquireSource, SyncEvent, SyncObserver, SyncState};
pub use manifest::fetch_manifest;
pub use orchestrator::{
    FailureKind, FileFailure, PendingFile, SyncOptions, SyncOrchestrator, SyncReport, SyncTask,
    VerifyReport,
};
pub use progress::{ProgressLedger, ProgressSnapshot};
pub use retry::RetryPolicy;
pub use scanner::{verify_file, InvalidReason, LocalStateScanner, Verification};
pub use transport::{HttpTransport, MemoryTransport, Transport};
pub use writer::{copy_staged, write_staged, CommitError, StagedFile};
