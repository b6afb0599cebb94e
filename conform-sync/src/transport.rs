//! Object store access.
//!
//! [`HttpTransport`] talks to the real flat-file HTTP store through `ureq`.
//! [`MemoryTransport`] serves objects from memory and records every request,
//! which is what the engine's tests run against.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use conform_core::TimeoutSettings;

use crate::error::TransportError;

/// A source of object bodies addressed by URL.
pub trait Transport: Send + Sync {
    /// Issue a GET and return the body as a stream.
    fn get(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Blocking HTTP/1.1 client with connect and read timeouts.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeouts: &TimeoutSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(timeouts.connect_secs))
            .timeout_read(Duration::from_secs(timeouts.read_secs))
            .user_agent(concat!("conform/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&TimeoutSettings::default())
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError> {
        match self.agent.get(url).call() {
            Ok(response) => Ok(Box::new(response.into_reader())),
            Err(ureq::Error::Status(code, _)) => Err(TransportError::Status(code)),
            Err(ureq::Error::Transport(transport)) => Err(classify_transport(&transport)),
        }
    }
}

fn classify_transport(transport: &ureq::Transport) -> TransportError {
    match transport.kind() {
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
            TransportError::InvalidUrl(transport.to_string())
        }
        _ if is_timeout(transport) => TransportError::Timeout(transport.to_string()),
        _ => TransportError::Connection(transport.to_string()),
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|e| e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock)
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// In-memory object store with scripted failures and a request log.
///
/// Unknown URLs answer `404`.
#[derive(Default)]
pub struct MemoryTransport {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, VecDeque<TransportError>>>,
    truncations: Mutex<HashMap<String, VecDeque<usize>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(url.into(), body.into());
    }

    /// The next request to `url` fails with `error` instead of being served.
    /// Calls queue up in order.
    pub fn fail_next(&self, url: impl Into<String>, error: TransportError) {
        lock(&self.failures)
            .entry(url.into())
            .or_default()
            .push_back(error);
    }

    /// The next successful request to `url` ends after `len` bytes, as if
    /// the connection dropped mid-body.
    pub fn truncate_next(&self, url: impl Into<String>, len: usize) {
        lock(&self.truncations)
            .entry(url.into())
            .or_default()
            .push_back(len);
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        lock(&self.requests).iter().filter(|u| *u == url).count()
    }
}

impl Transport for MemoryTransport {
    fn get(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError> {
        lock(&self.requests).push(url.to_string());
        if let Some(error) = lock(&self.failures).get_mut(url).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        let mut body = match lock(&self.objects).get(url) {
            Some(body) => body.clone(),
            None => return Err(TransportError::Status(404)),
        };
        if let Some(len) = lock(&self.truncations).get_mut(url).and_then(VecDeque::pop_front) {
            body.truncate(len);
        }
        Ok(Box::new(Cursor::new(body)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
