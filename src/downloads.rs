use crate::cache::{is_writable_dir, wait_for_leader, Admission, TrackCache};
use crate::error::CacheError;
use crate::key::{normalize_for_comparison, CanonicalKey};
use crate::location::resolve_location;
use crate::mime;
use crate::notify::{Notification, Notifier, PlaybackTarget, RemediationAction};
use crate::settings::DownloadSettings;
use crate::track::Track;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_TYPE};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

const GENERIC_EXTENSION: &str = "bin";

/// A track to fetch from the streaming server into the download folder.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub track: Track,
    pub source_uri: String,
}

impl DownloadRequest {
    pub fn new(track: Track, source_uri: impl Into<String>) -> Self {
        Self {
            track,
            source_uri: source_uri.into(),
        }
    }

    /// Name the track after `name` when it has no title of its own. The track
    /// carried by the request, and its key, then use that name.
    pub fn with_fallback_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.track.has_title() && !name.trim().is_empty() {
            self.track.title = Some(name);
        }
        self
    }

    /// Key the file and its ledger record are stored under.
    pub fn key(&self) -> CanonicalKey {
        self.track.key()
    }
}

/// Terminal state of one download attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// No download folder is configured.
    Unavailable,
    /// A verified copy was already in the folder; nothing was transferred.
    AlreadyPresent { path: PathBuf, bytes: u64 },
    Completed { path: PathBuf, bytes: u64 },
    Failed { message: String },
}

impl DownloadOutcome {
    /// Outcome for requests attached to a download that ended without reporting.
    pub(crate) fn abandoned() -> Self {
        DownloadOutcome::Failed {
            message: "Download was interrupted.".to_string(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            DownloadOutcome::AlreadyPresent { path, .. } | DownloadOutcome::Completed { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.path().is_some()
    }
}

/// Runs downloads on the tokio runtime, at most `max_concurrent_downloads`
/// transfers at a time. Cheap to clone.
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<TrackCache>,
    notifier: Arc<dyn Notifier>,
    client: reqwest::Client,
    connect_timeout: Duration,
    read_timeout: Duration,
    buffer_size: usize,
    permits: Semaphore,
}

impl Downloader {
    pub fn new(
        cache: Arc<TrackCache>,
        notifier: Arc<dyn Notifier>,
        settings: &DownloadSettings,
    ) -> Result<Self, CacheError> {
        // Compression is disabled so Content-Length describes the bytes we write.
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .user_agent(settings.user_agent.clone())
            .gzip(false)
            .brotli(false)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                cache,
                notifier,
                client,
                connect_timeout: settings.connect_timeout(),
                read_timeout: settings.read_timeout(),
                buffer_size: settings.buffer_size,
                permits: Semaphore::new(settings.max_concurrent_downloads.max(1)),
            }),
        })
    }

    pub fn cache(&self) -> &Arc<TrackCache> {
        &self.inner.cache
    }

    /// Start a download in the background. The handle resolves once the
    /// terminal notification has been sent.
    pub fn download(&self, request: DownloadRequest) -> JoinHandle<DownloadOutcome> {
        let this = self.clone();
        let span = info_span!("download", track = %request.track.id);
        tokio::spawn(async move { this.download_now(request).await }.instrument(span))
    }

    /// Start every request and wait for all of them, in request order.
    pub async fn download_all(&self, requests: Vec<DownloadRequest>) -> Vec<DownloadOutcome> {
        let handles: Vec<_> = requests.into_iter().map(|r| self.download(r)).collect();
        futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    error!(error = %e, "download task failed");
                    DownloadOutcome::abandoned()
                })
            })
            .collect()
    }

    /// Run a download on the current task.
    pub async fn download_now(&self, request: DownloadRequest) -> DownloadOutcome {
        let inner = &self.inner;

        let Some(location) = inner.cache.location().configured_location() else {
            info!(error = %CacheError::Unconfigured, "download unavailable");
            inner.notifier.notify(Notification::Unavailable {
                action: RemediationAction::OpenSettings,
            });
            return DownloadOutcome::Unavailable;
        };

        let base = request.track.file_base_name();
        let key = CanonicalKey::from_name(&base);

        let directory = match resolve_location(&location) {
            Some(dir) if is_writable_dir(&dir) => dir,
            resolved => {
                let path = resolved.unwrap_or_else(|| PathBuf::from(&location));
                return self.fail(None, None, CacheError::Unwritable { path }).await;
            }
        };

        let url = match parse_source(&request.source_uri) {
            Ok(url) => url,
            Err(e) => return self.fail(Some(&key), None, e).await,
        };

        let flight = match inner.cache.admit(&key) {
            Admission::Leader(flight) => flight,
            Admission::Follower(rx) => {
                debug!(key = %key, "download already running, waiting for it");
                return wait_for_leader(rx).await;
            }
        };

        let outcome = match inner.permits.acquire().await {
            Ok(_permit) => {
                let mut created = None;
                let result = self
                    .transfer(&request, url, &directory, &base, &key, &mut created)
                    .await;
                match result {
                    Ok(outcome) => outcome,
                    // A folder that refuses new files says nothing about the recorded ones.
                    Err(e @ CacheError::Unwritable { .. }) => self.fail(None, created, e).await,
                    Err(e) => self.fail(Some(&key), created, e).await,
                }
            }
            Err(_) => DownloadOutcome::abandoned(),
        };

        flight.finish(&outcome);
        outcome
    }

    async fn transfer(
        &self,
        request: &DownloadRequest,
        url: reqwest::Url,
        directory: &Path,
        base: &str,
        key: &CanonicalKey,
        created: &mut Option<PathBuf>,
    ) -> Result<DownloadOutcome, CacheError> {
        let inner = &self.inner;
        let ledger = inner.cache.ledger();

        info!(url = %url, "connecting");
        let response = timeout(
            inner.connect_timeout + inner.read_timeout,
            inner
                .client
                .get(url)
                .header(ACCEPT_ENCODING, "identity")
                .send(),
        )
        .await
        .map_err(|_| CacheError::Timeout("waiting for the server"))??;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Server {
                status: status.as_u16(),
            });
        }

        let declared = response.content_length().filter(|&n| n > 0);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let extension: &str = match mime::extension_for(content_type) {
            Some(ext) => ext,
            None => request.track.suffix().unwrap_or(GENERIC_EXTENSION),
        };
        debug!(content_type, ?declared, extension, "response accepted");

        let file_name = format!("{}.{}", base, extension);
        let target = directory.join(&file_name);

        if let Some((existing, local)) = find_existing(directory, &file_name).await? {
            let matches = match declared {
                Some(remote) => local == remote,
                None => local > 0 && ledger.size_of(key) == Some(local),
            };
            if matches {
                drop(response);
                ledger.record_size(key, local);
                inner.cache.refresh();
                let shown = existing
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file_name.clone());
                info!(file = %existing.display(), bytes = local, "already downloaded");
                inner
                    .notifier
                    .notify(Notification::AlreadyDownloaded { file_name: shown });
                return Ok(DownloadOutcome::AlreadyPresent {
                    path: existing,
                    bytes: local,
                });
            }

            info!(file = %existing.display(), local, ?declared, "replacing stale file");
            fs::remove_file(&existing).await?;
            ledger.remove(key);
            inner.cache.refresh();
        }

        let file = fs::File::create(&target).await.map_err(|e| {
            warn!(file = %target.display(), error = %e, "cannot create file");
            CacheError::Unwritable {
                path: directory.to_path_buf(),
            }
        })?;
        *created = Some(target.clone());
        let mut writer = BufWriter::with_capacity(inner.buffer_size, file);

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = timeout(inner.read_timeout, stream.next())
            .await
            .map_err(|_| CacheError::Timeout("reading the response body"))?
        {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        if written == 0 {
            return Err(CacheError::EmptyTransfer);
        }
        if let Some(expected) = declared {
            if expected != written {
                return Err(CacheError::IncompleteTransfer { expected, written });
            }
        }

        *created = None;
        ledger.record_size(key, written);
        inner.cache.refresh();
        info!(file = %target.display(), bytes = written, "download complete");

        let track = &request.track;
        inner.notifier.notify(Notification::Completed {
            target: PlaybackTarget {
                id: track.id.clone(),
                title: track.title.clone(),
                artist: track.artist.clone(),
                album: track.album.clone(),
                duration: track.duration.unwrap_or(0),
                file_name,
                path: target.clone(),
            },
        });

        Ok(DownloadOutcome::Completed {
            path: target,
            bytes: written,
        })
    }

    /// Remove whatever the attempt left behind, then report the failure.
    async fn fail(
        &self,
        key: Option<&CanonicalKey>,
        created: Option<PathBuf>,
        error: CacheError,
    ) -> DownloadOutcome {
        let inner = &self.inner;
        if let Some(path) = created {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(file = %path.display(), "removed partial file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %path.display(), error = %e, "failed to remove partial file"),
            }
            inner.cache.refresh();
        }
        if let Some(key) = key {
            inner.cache.ledger().remove(key);
        }

        warn!(error = %error, "download failed");
        let message = error.user_message();
        inner.notifier.notify(Notification::Failed {
            message: message.clone(),
        });
        DownloadOutcome::Failed { message }
    }
}

fn parse_source(uri: &str) -> Result<reqwest::Url, CacheError> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(CacheError::InvalidSource("Invalid media URI.".to_string()));
    }
    let url = reqwest::Url::parse(uri)
        .map_err(|_| CacheError::InvalidSource("Invalid media URI.".to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(CacheError::InvalidSource(
            "Unsupported media URI.".to_string(),
        )),
    }
}

/// File in `directory` whose name matches `file_name` after normalization.
async fn find_existing(
    directory: &Path,
    file_name: &str,
) -> Result<Option<(PathBuf, u64)>, CacheError> {
    let wanted = normalize_for_comparison(file_name);
    let mut listing = fs::read_dir(directory).await?;
    while let Some(entry) = listing.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if normalize_for_comparison(name) != wanted {
            continue;
        }
        let path = entry.path();
        let Ok(meta) = fs::metadata(&path).await else {
            continue;
        };
        if meta.is_file() {
            return Ok(Some((path, meta.len())));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_sources_are_accepted() {
        assert!(parse_source("https://music.example/stream?id=1").is_ok());
        assert!(parse_source(" http://10.0.0.2:4533/rest/stream ").is_ok());

        let msg = |uri| parse_source(uri).unwrap_err().user_message();
        assert_eq!(msg(""), "Invalid media URI.");
        assert_eq!(msg("not a uri"), "Invalid media URI.");
        assert_eq!(msg("file:///sdcard/Music/a.mp3"), "Unsupported media URI.");
        assert_eq!(msg("content://media/external/audio/1"), "Unsupported media URI.");
    }

    #[test]
    fn base_name_prefers_metadata_then_fallback() {
        let track = Track::new("7", "Windowlicker").with_artist("Aphex Twin");
        let req = DownloadRequest::new(track, "http://x/1").with_fallback_name("ignored");
        assert_eq!(req.track.file_base_name(), "Aphex Twin - Windowlicker");

        let untitled = Track {
            id: "tr-9".into(),
            ..Default::default()
        };
        let req = DownloadRequest::new(untitled.clone(), "http://x/1");
        assert_eq!(req.track.file_base_name(), "tr-9");
        let req = DownloadRequest::new(untitled, "http://x/1").with_fallback_name("Voice memo");
        assert_eq!(req.track.file_base_name(), "Voice memo");
        assert_eq!(req.key(), CanonicalKey::from_file_name("Voice memo.mp3"));

        let req = DownloadRequest::new(Track::default(), "http://x/1").with_fallback_name("  ");
        assert_eq!(req.track.file_base_name(), "download");
    }

    #[test]
    fn base_name_is_sanitized() {
        let track = Track::new("1", "What?  Why: Because").with_artist("AC/DC");
        let req = DownloadRequest::new(track, "http://x/1");
        assert_eq!(req.track.file_base_name(), "AC_DC - What_ Why_ Because");
    }

    #[test]
    fn outcome_paths() {
        let done = DownloadOutcome::Completed {
            path: PathBuf::from("/m/a.mp3"),
            bytes: 3,
        };
        assert!(done.is_success());
        assert_eq!(done.path(), Some(Path::new("/m/a.mp3")));
        assert!(!DownloadOutcome::Unavailable.is_success());
        assert!(!DownloadOutcome::abandoned().is_success());
    }
}
