//! Reuse of verified files from a separate, already-present installation.
//!
//! A donor copy is only used after it passes the same size-then-hash gate
//! as the destination. Anything else is a miss, never an error: the caller
//! falls back to the network.

use std::path::{Path, PathBuf};

use conform_core::ManifestEntry;

use crate::scanner::{InvalidReason, LocalStateScanner, Verification};
use crate::writer::{copy_staged, CommitError};

/// Finds the donor installation root, if there is one.
pub trait DonorLocator {
    fn resolve_donor_root(&self) -> Option<PathBuf>;
}

impl DonorLocator for Option<PathBuf> {
    fn resolve_donor_root(&self) -> Option<PathBuf> {
        self.clone()
    }
}

impl<F> DonorLocator for F
where
    F: Fn() -> Option<PathBuf>,
{
    fn resolve_donor_root(&self) -> Option<PathBuf> {
        self()
    }
}

/// No donor installation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDonor;

impl DonorLocator for NoDonor {
    fn resolve_donor_root(&self) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug)]
pub enum DonorOutcome {
    Copied,
    Miss(MissReason),
}

impl DonorOutcome {
    pub fn is_copied(&self) -> bool {
        matches!(self, DonorOutcome::Copied)
    }
}

#[derive(Debug)]
pub enum MissReason {
    /// No file at the donor path.
    Absent,
    /// A file exists but does not match the entry.
    Rejected(InvalidReason),
    /// Verified, but placing the copy failed.
    CopyFailed(CommitError),
}

pub struct LocalSourceResolver {
    scanner: LocalStateScanner,
}

impl LocalSourceResolver {
    pub fn new(donor_root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            scanner: LocalStateScanner::new(donor_root, chunk_size),
        }
    }

    pub fn donor_root(&self) -> &Path {
        self.scanner.root()
    }

    /// Copy `entry` from the donor root into `dest_root` if the donor copy
    /// verifies.
    pub fn try_acquire_locally(&self, entry: &ManifestEntry, dest_root: &Path) -> DonorOutcome {
        let src = entry.path.join_to(self.scanner.root());
        if !src.is_file() {
            return DonorOutcome::Miss(MissReason::Absent);
        }

        if let Verification::Invalid(reason) = self.scanner.verify(entry) {
            tracing::debug!(path = %entry.path, %reason, "donor copy rejected");
            return DonorOutcome::Miss(MissReason::Rejected(reason));
        }

        let dest = entry.path.join_to(dest_root);
        match copy_staged(&src, &dest, Some(&entry.hash), self.scanner.chunk_size()) {
            Ok(_) => {
                tracing::info!(path = %entry.path, bytes = entry.size, "copied from donor");
                DonorOutcome::Copied
            }
            Err(err) => {
                tracing::warn!(path = %entry.path, error = %err, "donor copy failed");
                DonorOutcome::Miss(MissReason::CopyFailed(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_core::{hash_bytes, RelPath};
    use tempfile::TempDir;

    fn entry(path: &str, bytes: &[u8]) -> ManifestEntry {
        ManifestEntry {
            path: RelPath::parse(path).unwrap(),
            size: bytes.len() as u64,
            hash: hash_bytes(bytes),
        }
    }

    #[test]
    fn verified_donor_file_is_copied() {
        let donor = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::create_dir_all(donor.path().join("Data")).unwrap();
        std::fs::write(donor.path().join("Data/a.bin"), b"game asset").unwrap();

        let resolver = LocalSourceResolver::new(donor.path(), 4);
        let outcome = resolver.try_acquire_locally(&entry("Data/a.bin", b"game asset"), dest.path());
        assert!(outcome.is_copied());
        assert_eq!(std::fs::read(dest.path().join("Data/a.bin")).unwrap(), b"game asset");
    }

    #[test]
    fn absent_donor_file_has_no_side_effect() {
        let donor = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let resolver = LocalSourceResolver::new(donor.path(), 64);
        let outcome = resolver.try_acquire_locally(&entry("Data/a.bin", b"x"), dest.path());
        assert!(matches!(outcome, DonorOutcome::Miss(MissReason::Absent)));
        assert!(!dest.path().join("Data").exists());
    }

    #[test]
    fn mismatching_donor_file_is_a_miss_not_a_copy() {
        let donor = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::write(donor.path().join("a.bin"), b"tampered!!").unwrap();

        let resolver = LocalSourceResolver::new(donor.path(), 64);
        let outcome = resolver.try_acquire_locally(&entry("a.bin", b"game asset"), dest.path());
        assert!(matches!(
            outcome,
            DonorOutcome::Miss(MissReason::Rejected(InvalidReason::HashMismatch { .. }))
        ));
        assert!(!dest.path().join("a.bin").exists());
    }

    #[test]
    fn wrong_size_donor_file_is_a_miss() {
        let donor = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::write(donor.path().join("a.bin"), b"short").unwrap();

        let resolver = LocalSourceResolver::new(donor.path(), 64);
        let outcome = resolver.try_acquire_locally(&entry("a.bin", b"game asset"), dest.path());
        assert!(matches!(
            outcome,
            DonorOutcome::Miss(MissReason::Rejected(InvalidReason::SizeMismatch { .. }))
        ));
    }

    #[test]
    fn locators() {
        assert_eq!(NoDonor.resolve_donor_root(), None);
        let fixed = Some(PathBuf::from("/donor"));
        assert_eq!(fixed.resolve_donor_root(), Some(PathBuf::from("/donor")));
        let from_fn = || Some(PathBuf::from("/elsewhere"));
        assert_eq!(from_fn.resolve_donor_root(), Some(PathBuf::from("/elsewhere")));
    }
}
