//! Streaming download of a single object.
//!
//! The body is read in bounded chunks. After every chunk the progress
//! callback receives the number of bytes read so far for this object, and
//! the cancellation token is checked. No retries happen here.

use std::io::{self, Read, Write};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use conform_core::RelPath;

use crate::cancel::CancelToken;
use crate::error::DownloadError;
use crate::transport::Transport;

/// Bytes left untouched inside a URL path segment.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `base` + the percent-encoded segments of `path`.
pub fn object_url(base: &str, path: &RelPath) -> String {
    let mut url = base.to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    let encoded: Vec<String> = path
        .segments()
        .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
        .collect();
    url.push_str(&encoded.join("/"));
    url
}

pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    chunk_size: usize,
}

impl<'a> Downloader<'a> {
    pub fn new(transport: &'a dyn Transport, chunk_size: usize) -> Self {
        Self {
            transport,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Fetch `url` into memory.
    ///
    /// The buffer grows with the body; a declared size only bounds it.
    pub fn fetch(
        &self,
        url: &str,
        expected_size: Option<u64>,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<Vec<u8>, DownloadError> {
        let capacity = expected_size.map_or(0, |n| n.min(self.chunk_size as u64) as usize);
        let mut bytes = Vec::with_capacity(capacity);
        self.fetch_into(url, expected_size, &mut bytes, cancel, on_progress)?;
        Ok(bytes)
    }

    /// Stream `url` into `sink`, returning the number of bytes received.
    ///
    /// With `expected_size` set, a longer body fails as soon as it overruns
    /// and a shorter one fails at the end.
    pub fn fetch_into(
        &self,
        url: &str,
        expected_size: Option<u64>,
        sink: &mut dyn Write,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<u64, DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let mut body = self.transport.get(url)?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut received = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DownloadError::Body(e)),
            };
            received += n as u64;
            if let Some(expected) = expected_size {
                if received > expected {
                    return Err(DownloadError::TooLarge { expected });
                }
            }
            sink.write_all(&buf[..n]).map_err(DownloadError::Sink)?;
            on_progress(received);
        }

        if let Some(expected) = expected_size {
            if received < expected {
                return Err(DownloadError::Truncated { expected, received });
            }
        }
        tracing::debug!(url, bytes = received, "download finished");
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::MemoryTransport;

    const URL: &str = "http://store/a.bin";

    fn store_with(body: &[u8]) -> MemoryTransport {
        let store = MemoryTransport::new();
        store.insert(URL, body.to_vec());
        store
    }

    #[test]
    fn object_url_joins_and_encodes() {
        let path = RelPath::parse("Data Files/ünï code/a+b.bin").unwrap();
        assert_eq!(
            object_url("https://h/download/", &path),
            "https://h/download/Data%20Files/%C3%BCn%C3%AF%20code/a%2Bb.bin"
        );
        assert_eq!(
            object_url("https://h/download", &RelPath::parse("x/y.dll").unwrap()),
            "https://h/download/x/y.dll"
        );
    }

    #[test]
    fn progress_reports_running_total_per_chunk() {
        let store = store_with(&[7u8; 10]);
        let downloader = Downloader::new(&store, 4);
        let mut seen = Vec::new();
        let bytes = downloader
            .fetch(URL, Some(10), &CancelToken::new(), &mut |n| seen.push(n))
            .unwrap();
        assert_eq!(bytes, vec![7u8; 10]);
        assert_eq!(seen, vec![4, 8, 10]);
    }

    #[test]
    fn oversize_body_is_rejected() {
        let store = store_with(&[0u8; 12]);
        let downloader = Downloader::new(&store, 4);
        let err = downloader
            .fetch(URL, Some(10), &CancelToken::new(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, DownloadError::TooLarge { expected: 10 }));
    }

    #[test]
    fn short_body_is_truncated() {
        let store = store_with(&[0u8; 6]);
        let downloader = Downloader::new(&store, 4);
        let err = downloader
            .fetch(URL, Some(10), &CancelToken::new(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, DownloadError::Truncated { expected: 10, received: 6 }));
        assert!(err.is_retryable());
    }

    #[test]
    fn huge_declared_size_does_not_preallocate() {
        let store = store_with(b"tiny");
        let downloader = Downloader::new(&store, 4);
        let err = downloader
            .fetch(URL, Some(u64::MAX), &CancelToken::new(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            DownloadError::Truncated { expected: u64::MAX, received: 4 }
        ));
    }

    #[test]
    fn unknown_size_accepts_any_length() {
        let store = store_with(b"whatever length");
        let downloader = Downloader::new(&store, 4);
        let bytes = downloader
            .fetch(URL, None, &CancelToken::new(), &mut |_| {})
            .unwrap();
        assert_eq!(bytes, b"whatever length");
    }

    #[test]
    fn http_errors_surface_as_transport_errors() {
        let store = MemoryTransport::new();
        let downloader = Downloader::new(&store, 4);
        let err = downloader
            .fetch(URL, Some(1), &CancelToken::new(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, DownloadError::Transport(TransportError::Status(404))));
        assert!(!err.is_retryable());
    }

    #[test]
    fn cancellation_stops_between_chunks() {
        let store = store_with(&[1u8; 64]);
        let downloader = Downloader::new(&store, 8);
        let cancel = CancelToken::new();
        let mut calls = 0;
        let err = downloader
            .fetch(URL, Some(64), &cancel, &mut |_| {
                calls += 1;
                if calls == 2 {
                    cancel.cancel();
                }
            })
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
        assert_eq!(calls, 2);
    }
}
