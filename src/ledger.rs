use crate::error::CacheError;
use crate::key::CanonicalKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Persisted expected-size record for every file the download pipeline has
/// verified. Reconciliation trusts a file only when its length matches.
pub trait Ledger: Send + Sync {
    fn snapshot(&self) -> HashMap<CanonicalKey, u64>;
    fn size_of(&self, key: &CanonicalKey) -> Option<u64>;
    /// Sizes of zero are not valid records and remove the key instead.
    fn record_size(&self, key: &CanonicalKey, size: u64);
    fn remove(&self, key: &CanonicalKey);
    fn clear(&self);

    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub size: u64,
    /// Unix timestamp of the last verification.
    pub recorded_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerIndex {
    pub entries: HashMap<CanonicalKey, LedgerEntry>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ledger kept in a JSON index file next to the app's other state.
///
/// The in-memory index is authoritative for the running process; a failed
/// write is logged and retried on the next mutation.
pub struct JsonLedger {
    index_file: PathBuf,
    index: Mutex<LedgerIndex>,
}

impl JsonLedger {
    pub fn open(index_file: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = index_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let index = if index_file.exists() {
            Self::load_index(index_file)
        } else {
            LedgerIndex::default()
        };
        debug!(
            file = %index_file.display(),
            entries = index.entries.len(),
            "opened download ledger"
        );

        Ok(Self {
            index_file: index_file.to_path_buf(),
            index: Mutex::new(index),
        })
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    fn load_index(index_file: &Path) -> LedgerIndex {
        let parsed = fs::read_to_string(index_file)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<LedgerIndex>(&content).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(index) => index,
            Err(e) => {
                // Every file will fail verification and be re-downloaded on demand.
                warn!(file = %index_file.display(), error = %e, "unreadable ledger, starting empty");
                LedgerIndex::default()
            }
        }
    }

    fn save_index(&self, index: &LedgerIndex) {
        if let Err(e) = self.write_index(index) {
            warn!(file = %self.index_file.display(), error = %e, "failed to persist ledger");
        }
    }

    fn write_index(&self, index: &LedgerIndex) -> Result<(), CacheError> {
        let content = serde_json::to_string_pretty(index)
            .map_err(|e| CacheError::Settings(format!("Failed to serialize ledger: {}", e)))?;
        let tmp = self.index_file.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.index_file)?;
        Ok(())
    }
}

impl Ledger for JsonLedger {
    fn snapshot(&self) -> HashMap<CanonicalKey, u64> {
        lock(&self.index)
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.size))
            .collect()
    }

    fn size_of(&self, key: &CanonicalKey) -> Option<u64> {
        lock(&self.index).entries.get(key).map(|e| e.size)
    }

    fn record_size(&self, key: &CanonicalKey, size: u64) {
        if size == 0 {
            self.remove(key);
            return;
        }
        let mut index = lock(&self.index);
        index.entries.insert(
            key.clone(),
            LedgerEntry {
                size,
                recorded_at: chrono::Utc::now().timestamp(),
            },
        );
        self.save_index(&index);
    }

    fn remove(&self, key: &CanonicalKey) {
        let mut index = lock(&self.index);
        if index.entries.remove(key).is_some() {
            self.save_index(&index);
        }
    }

    fn clear(&self) {
        let mut index = lock(&self.index);
        if !index.entries.is_empty() {
            index.entries.clear();
            self.save_index(&index);
        }
    }

    fn len(&self) -> usize {
        lock(&self.index).entries.len()
    }
}

/// Ledger that lives only as long as the process.
#[derive(Default)]
pub struct MemoryLedger {
    sizes: Mutex<HashMap<CanonicalKey, u64>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn snapshot(&self) -> HashMap<CanonicalKey, u64> {
        lock(&self.sizes).clone()
    }

    fn size_of(&self, key: &CanonicalKey) -> Option<u64> {
        lock(&self.sizes).get(key).copied()
    }

    fn record_size(&self, key: &CanonicalKey, size: u64) {
        let mut sizes = lock(&self.sizes);
        if size == 0 {
            sizes.remove(key);
        } else {
            sizes.insert(key.clone(), size);
        }
    }

    fn remove(&self, key: &CanonicalKey) {
        lock(&self.sizes).remove(key);
    }

    fn clear(&self) {
        lock(&self.sizes).clear();
    }
}
