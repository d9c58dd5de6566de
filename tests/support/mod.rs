#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use trackvault::{
    ChannelNotifier, DownloadSettings, Downloader, FixedLocation, MemoryLedger, Notification,
    TrackCache,
};

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Loopback HTTP server that counts the requests it answers.
pub struct TestServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Routes:
/// - `/audio/:size` `size` bytes of `audio/mpeg`
/// - `/versioned` 4096 bytes whose value is the request count
/// - `/slow` 2048 bytes of `audio/flac` after 300ms
/// - `/octet` 100 bytes of `application/octet-stream`
/// - `/empty` an empty `audio/mpeg` body
/// - `/missing` 404
pub async fn spawn_server() -> TestServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/audio/:size", get(audio))
        .route("/versioned", get(versioned))
        .route("/slow", get(slow))
        .route("/octet", get(octet))
        .route("/empty", get(empty))
        .route("/missing", get(missing))
        .with_state(hits.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind to random port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    TestServer { addr, hits }
}

async fn audio(State(hits): State<Arc<AtomicUsize>>, Path(size): Path<usize>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "audio/mpeg")], vec![0xA5u8; size])
}

async fn versioned(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    let version = hits.fetch_add(1, Ordering::SeqCst) + 1;
    ([(header::CONTENT_TYPE, "audio/mpeg")], vec![version as u8; 4096])
}

async fn slow(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    ([(header::CONTENT_TYPE, "audio/flac")], vec![7u8; 2048])
}

async fn octet(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "application/octet-stream")], vec![1u8; 100])
}

async fn empty(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "audio/mpeg")], Vec::<u8>::new())
}

async fn missing(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

/// Hand-written responses for failures a well-behaved server never produces.
#[derive(Clone, Copy, Debug)]
pub enum RawResponse {
    /// Declares `declared` bytes, sends `sent`, then closes the connection.
    Truncated { declared: usize, sent: usize },
    /// Declares `declared` bytes, sends `sent`, then goes silent.
    Stalled { declared: usize, sent: usize },
    /// No Content-Length; the body ends when the connection closes.
    Unsized { len: usize },
}

pub async fn spawn_raw_server(response: RawResponse) -> TestServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let (head, body_len) = match response {
                    RawResponse::Truncated { declared, sent }
                    | RawResponse::Stalled { declared, sent } => (
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: {}\r\n\r\n",
                            declared
                        ),
                        sent,
                    ),
                    RawResponse::Unsized { len } => (
                        "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nConnection: close\r\n\r\n"
                            .to_string(),
                        len,
                    ),
                };
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&vec![3u8; body_len]).await;
                let _ = socket.flush().await;

                if let RawResponse::Stalled { .. } = response {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    TestServer { addr, hits }
}

/// A download folder, an in-memory ledger, and a downloader wired to a
/// channel notifier.
pub struct Harness {
    pub music: TempDir,
    pub location: Arc<FixedLocation>,
    pub ledger: Arc<MemoryLedger>,
    pub cache: Arc<TrackCache>,
    pub downloader: Downloader,
    pub notifications: UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(DownloadSettings::default())
    }

    pub fn with_settings(settings: DownloadSettings) -> Self {
        tracing_init();
        let music = TempDir::new().unwrap();
        let location = Arc::new(FixedLocation::new(Some(
            music.path().to_string_lossy().into_owned(),
        )));
        let ledger = Arc::new(MemoryLedger::new());
        let cache = Arc::new(TrackCache::new(location.clone(), ledger.clone()));
        let (notifier, notifications) = ChannelNotifier::new();
        let downloader = Downloader::new(cache.clone(), Arc::new(notifier), &settings)
            .expect("failed to build downloader");
        Self {
            music,
            location,
            ledger,
            cache,
            downloader,
            notifications,
        }
    }

    /// Notifications sent so far.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut sent = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            sent.push(n);
        }
        sent
    }

    /// Names of the files currently in the download folder, sorted.
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.music.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
