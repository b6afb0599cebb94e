#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

use conform_core::hash_bytes;
use conform_sync::{
    MemoryTransport, RetryPolicy, SyncEvent, SyncOptions, SyncOrchestrator, SyncState,
};
use serde_json::json;

pub const MANIFEST_URL: &str = "http://store.test/manifest.json";
pub const BASE_URL: &str = "http://store.test/files";

pub fn file_url(path: &str) -> String {
    format!("{BASE_URL}/{path}")
}

/// A manifest document in the producer's wire format.
pub fn manifest_json(files: &[(&str, &[u8])]) -> String {
    let entries: Vec<_> = files
        .iter()
        .map(|(path, bytes)| {
            json!({
                "path": path,
                "size": bytes.len(),
                "xxhash": hash_bytes(bytes).as_str(),
            })
        })
        .collect();
    let total: usize = files.iter().map(|(_, b)| b.len()).sum();
    json!({
        "scanned_folder": "game",
        "total_files": files.len(),
        "total_size": total,
        "files": entries,
    })
    .to_string()
}

/// A memory store serving `files` under [`BASE_URL`] and their manifest.
pub fn store_with(files: &[(&str, &[u8])]) -> Arc<MemoryTransport> {
    let store = Arc::new(MemoryTransport::new());
    store.insert(MANIFEST_URL, manifest_json(files));
    for (path, bytes) in files {
        store.insert(file_url(path), bytes.to_vec());
    }
    store
}

pub fn options(dest: &Path) -> SyncOptions {
    let mut options = SyncOptions::new(MANIFEST_URL, BASE_URL, dest);
    options.retry = RetryPolicy::immediate(3);
    options.chunk_size = 32;
    options
}

/// An orchestrator wired to a channel observer.
pub fn orchestrator(
    options: SyncOptions,
    store: Arc<MemoryTransport>,
) -> (SyncOrchestrator, Receiver<SyncEvent>) {
    let (tx, rx) = mpsc::channel();
    (SyncOrchestrator::new(options, store, tx), rx)
}

pub fn states(rx: &Receiver<SyncEvent>) -> Vec<SyncState> {
    rx.try_iter()
        .filter_map(|event| match event {
            SyncEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect()
}

pub fn write_file(root: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(&path, bytes).expect("write fixture file");
    path
}

/// Every file under `root`, relative, sorted.
pub fn tree(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(read) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP fixture
// ---------------------------------------------------------------------------

/// Single-threaded HTTP/1.1 server answering GETs from a route table.
///
/// Every response closes the connection. The accept loop runs until the
/// test process exits.
pub struct FixtureServer {
    base: String,
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl FixtureServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture server");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        let routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>> = Arc::default();
        let hits: Arc<Mutex<Vec<String>>> = Arc::default();

        let (routes_bg, hits_bg) = (routes.clone(), hits.clone());
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                serve(stream, &routes_bg, &hits_bg);
            }
        });

        Self { base, routes, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn route(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .expect("routes")
            .insert(path.to_string(), (status, body.into()));
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("hits").clone()
    }
}

fn serve(
    stream: TcpStream,
    routes: &Mutex<HashMap<String, (u16, Vec<u8>)>>,
    hits: &Mutex<Vec<String>>,
) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut header = String::new();
        match reader.read_line(&mut header) {
            Ok(0) => break,
            Ok(_) if header == "\r\n" || header == "\n" => break,
            Ok(_) => continue,
            Err(_) => return,
        }
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    hits.lock().expect("hits").push(path.clone());
    let (status, body) = routes
        .lock()
        .expect("routes")
        .get(&path)
        .cloned()
        .unwrap_or((404, b"not found".to_vec()));

    let mut stream = stream;
    let head = format!(
        "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        reason_phrase(status),
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
