//! One-shot manifest retrieval.

use std::io::Read;

use conform_core::Manifest;

use crate::error::{ManifestFetchError, SyncError};
use crate::transport::Transport;

/// GET and parse the manifest at `url`.
///
/// Any failure here is fatal to the run; there is no retry and no partial
/// manifest.
pub fn fetch_manifest(transport: &dyn Transport, url: &str) -> Result<Manifest, SyncError> {
    let unavailable = |cause: ManifestFetchError| SyncError::ManifestUnavailable {
        url: url.to_string(),
        cause,
    };

    let mut body = transport.get(url).map_err(|e| unavailable(e.into()))?;
    let mut document = String::new();
    body.read_to_string(&mut document)
        .map_err(|e| unavailable(ManifestFetchError::Read(e)))?;
    let manifest = Manifest::from_json(&document).map_err(|e| unavailable(e.into()))?;

    if !manifest.totals_consistent() {
        tracing::warn!(
            declared_files = manifest.declared_files(),
            declared_size = manifest.declared_size(),
            files = manifest.entries().len(),
            size = manifest.total_size(),
            "manifest totals disagree with its entries; using recomputed totals"
        );
    }
    tracing::info!(
        url,
        files = manifest.entries().len(),
        bytes = manifest.total_size(),
        "manifest loaded"
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::MemoryTransport;

    const URL: &str = "http://h/manifest.json";

    #[test]
    fn parses_served_document() {
        let store = MemoryTransport::new();
        store.insert(
            URL,
            r#"{"total_files":1,"total_size":3,"files":[{"path":"a.bin","size":3,"xxhash":"44bc2cf5ad770999"}]}"#,
        );
        let manifest = fetch_manifest(&store, URL).unwrap();
        assert_eq!(manifest.entries().len(), 1);
        assert_eq!(manifest.total_size(), 3);
    }

    #[test]
    fn transport_failure_is_unavailable() {
        let store = MemoryTransport::new();
        store.fail_next(URL, TransportError::Timeout("slow".into()));
        let err = fetch_manifest(&store, URL).unwrap_err();
        let SyncError::ManifestUnavailable { url, cause } = err;
        assert_eq!(url, URL);
        assert!(matches!(cause, ManifestFetchError::Transport(TransportError::Timeout(_))));
        assert_eq!(store.request_count(URL), 1);
    }

    #[test]
    fn malformed_document_is_unavailable() {
        let store = MemoryTransport::new();
        store.insert(URL, "{\"files\": [{\"path\": \"\", \"size\": \"big\"}]}");
        let SyncError::ManifestUnavailable { cause, .. } = fetch_manifest(&store, URL).unwrap_err();
        assert!(matches!(cause, ManifestFetchError::Malformed(_)));
    }

    #[test]
    fn non_utf8_body_is_a_read_error() {
        let store = MemoryTransport::new();
        store.insert(URL, vec![0xff, 0xfe, 0x00]);
        let SyncError::ManifestUnavailable { cause, .. } = fetch_manifest(&store, URL).unwrap_err();
        assert!(matches!(cause, ManifestFetchError::Read(_)));
    }
}
