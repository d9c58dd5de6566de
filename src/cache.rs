use crate::downloads::DownloadOutcome;
use crate::error::CacheError;
use crate::key::CanonicalKey;
use crate::ledger::Ledger;
use crate::location::{resolve_location, LocationProvider};
use crate::track::Track;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A file in the download folder whose length matched the ledger at the last
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub key: CanonicalKey,
    pub path: PathBuf,
    pub size: u64,
}

type OutcomeReceiver = watch::Receiver<Option<DownloadOutcome>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<CanonicalKey, CachedFile>,
    /// Location identifier the entries were built from. `None` forces a rescan.
    reconciled: Option<String>,
    in_flight: HashMap<CanonicalKey, (u64, OutcomeReceiver)>,
    next_generation: u64,
}

/// In-memory view of the download folder, reconciled against the ledger.
///
/// Lookups, deletes, rescans and in-flight bookkeeping share one lock. No
/// network I/O happens while it is held.
pub struct TrackCache {
    location: Arc<dyn LocationProvider>,
    ledger: Arc<dyn Ledger>,
    state: Mutex<CacheState>,
}

impl TrackCache {
    pub fn new(location: Arc<dyn LocationProvider>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            location,
            ledger,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn location(&self) -> &Arc<dyn LocationProvider> {
        &self.location
    }

    /// Currently configured folder, resolved to a local path.
    /// The outer `None` means nothing is configured.
    pub fn configured_directory(&self) -> Option<Option<PathBuf>> {
        self.location
            .configured_location()
            .map(|id| resolve_location(&id))
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the cache if the configured folder changed since the last scan.
    pub fn ensure_fresh(&self) {
        let mut state = self.lock();
        self.ensure_fresh_locked(&mut state);
    }

    fn ensure_fresh_locked(&self, state: &mut CacheState) {
        let Some(location) = self.location.configured_location() else {
            if state.reconciled.is_some() || !state.entries.is_empty() {
                info!("download folder unconfigured, dropping cache and ledger");
            }
            state.entries.clear();
            state.reconciled = None;
            // Records without a folder can never be verified again.
            self.ledger.clear();
            return;
        };

        if state.reconciled.as_deref() == Some(location.as_str()) {
            return;
        }

        state.entries.clear();
        // Cleared until this scan succeeds, so a failed scan is retried on the next call.
        state.reconciled = None;

        let Some(directory) = resolve_location(&location) else {
            warn!(location = %location, "download folder has no local path");
            return;
        };

        let listing = match fs::read_dir(&directory) {
            Ok(listing) => listing,
            Err(source) => {
                let error = CacheError::Unreadable {
                    path: directory,
                    source,
                };
                warn!(error = %error, "reconciliation skipped");
                return;
            }
        };

        let expected_sizes = self.ledger.snapshot();
        let mut verified: HashSet<CanonicalKey> = HashSet::new();
        let mut rejected = 0usize;

        for entry in listing.flatten() {
            let path = entry.path();
            // Follows symlinks, so a link to a track counts as the track.
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            if meta.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };

            let key = CanonicalKey::from_file_name(&name);
            let actual = meta.len();
            match expected_sizes.get(&key) {
                Some(&expected) if expected > 0 && expected == actual => {
                    if verified.insert(key.clone()) {
                        state.entries.insert(
                            key.clone(),
                            CachedFile {
                                key,
                                path,
                                size: actual,
                            },
                        );
                    }
                }
                Some(&expected) => {
                    debug!(file = %name, expected, actual, "size mismatch, not cached");
                    rejected += 1;
                }
                None => {}
            }
        }

        if !expected_sizes.is_empty() {
            if verified.is_empty() {
                self.ledger.clear();
            } else {
                for key in expected_sizes.keys().filter(|k| !verified.contains(*k)) {
                    self.ledger.remove(key);
                }
            }
        }

        info!(
            dir = %directory.display(),
            cached = state.entries.len(),
            rejected,
            pruned = expected_sizes.len() - verified.len(),
            "reconciled download folder"
        );
        state.reconciled = Some(location);
    }

    /// Forget the current view; the next lookup rescans the folder.
    pub fn refresh(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.reconciled = None;
    }

    /// Path of the verified file for a track, if it still exists.
    pub fn resolve(&self, artist: &str, title: &str, album: &str) -> Option<PathBuf> {
        self.resolve_key(&CanonicalKey::for_track(artist, title, album))
    }

    pub fn resolve_track(&self, track: &Track) -> Option<PathBuf> {
        self.resolve_key(&track.key())
    }

    fn resolve_key(&self, key: &CanonicalKey) -> Option<PathBuf> {
        let mut state = self.lock();
        self.ensure_fresh_locked(&mut state);
        if state.reconciled.is_none() {
            return None;
        }

        let entry = state.entries.get(key)?;
        // The folder may have been changed behind our back since the last scan.
        if entry.path.is_file() {
            Some(entry.path.clone())
        } else {
            debug!(key = %key, "cached file vanished");
            None
        }
    }

    /// Delete a track's file. Bookkeeping is only dropped once the file is gone.
    pub fn delete(&self, track: &Track) -> bool {
        let key = track.key();
        let mut state = self.lock();
        self.ensure_fresh_locked(&mut state);
        if state.reconciled.is_none() {
            return false;
        }

        let Some(path) = state.entries.get(&key).map(|e| e.path.clone()) else {
            return false;
        };
        if !path.is_file() {
            return false;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                info!(file = %path.display(), "deleted downloaded track");
                state.entries.remove(&key);
                self.ledger.remove(&key);
                true
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to delete downloaded track");
                false
            }
        }
    }

    /// All verified files, ordered by key.
    pub fn entries(&self) -> Vec<CachedFile> {
        let mut state = self.lock();
        self.ensure_fresh_locked(&mut state);
        let mut files: Vec<CachedFile> = state.entries.values().cloned().collect();
        files.sort_by(|a, b| a.key.cmp(&b.key));
        files
    }

    /// Register a download for `key`, or attach to the one already running.
    pub(crate) fn admit(&self, key: &CanonicalKey) -> Admission<'_> {
        let mut state = self.lock();
        if let Some((_, rx)) = state.in_flight.get(key) {
            return Admission::Follower(rx.clone());
        }
        let generation = state.next_generation;
        state.next_generation += 1;
        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(key.clone(), (generation, rx));
        Admission::Leader(InFlight {
            cache: self,
            key: key.clone(),
            generation,
            tx: Some(tx),
        })
    }

    pub fn is_in_flight(&self, key: &CanonicalKey) -> bool {
        self.lock().in_flight.contains_key(key)
    }

    fn release(&self, key: &CanonicalKey, generation: u64) {
        let mut state = self.lock();
        if matches!(state.in_flight.get(key), Some((g, _)) if *g == generation) {
            state.in_flight.remove(key);
        }
    }
}

pub(crate) enum Admission<'a> {
    Leader(InFlight<'a>),
    Follower(OutcomeReceiver),
}

/// Registration of a running download. Releasing it publishes the outcome to
/// every request that attached while it ran.
pub(crate) struct InFlight<'a> {
    cache: &'a TrackCache,
    key: CanonicalKey,
    generation: u64,
    tx: Option<watch::Sender<Option<DownloadOutcome>>>,
}

impl InFlight<'_> {
    pub(crate) fn finish(mut self, outcome: &DownloadOutcome) {
        self.cache.release(&self.key, self.generation);
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome.clone()));
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.cache.release(&self.key, self.generation);
        }
    }
}

/// Wait for the download a follower attached to.
pub(crate) async fn wait_for_leader(mut rx: OutcomeReceiver) -> DownloadOutcome {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => (*outcome).clone().unwrap_or_else(DownloadOutcome::abandoned),
        Err(_) => DownloadOutcome::abandoned(),
    }
}

/// Directory is usable as a download target.
pub(crate) fn is_writable_dir(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}
