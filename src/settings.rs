use crate::error::CacheError;
use crate::location::LocationProvider;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_USER_AGENT: &str = concat!("trackvault/", env!("CARGO_PKG_VERSION"));

// Download settings with persistence support
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Identifier of the user-chosen download folder (path or `file://` URI).
    pub download_directory: Option<String>,

    // Network configuration
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub user_agent: String,

    // Transfer configuration
    pub buffer_size: usize,
    pub max_concurrent_downloads: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_directory: None,
            connect_timeout_ms: 15_000,
            read_timeout_ms: 60_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            buffer_size: 8192,
            max_concurrent_downloads: 2,
        }
    }
}

impl DownloadSettings {
    /// Load settings from disk, using defaults if the file is missing or unreadable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!(file = %path.display(), "settings file not found, using defaults");
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<DownloadSettings>(&content).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(mut settings) => {
                settings.validate();
                info!(file = %path.display(), "loaded download settings");
                settings
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to read settings, using defaults");
                Self::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::Settings(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| CacheError::Settings(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CacheError::Settings(format!("Failed to write settings file: {}", e)))?;

        info!(file = %path.display(), "saved download settings");
        Ok(())
    }

    /// Clamp settings to workable ranges
    pub fn validate(&mut self) {
        self.connect_timeout_ms = self.connect_timeout_ms.clamp(1_000, 120_000);
        self.read_timeout_ms = self.read_timeout_ms.clamp(1_000, 600_000);
        self.buffer_size = self.buffer_size.clamp(1024, 1024 * 1024);
        self.max_concurrent_downloads = self.max_concurrent_downloads.clamp(1, 8);

        if self.user_agent.trim().is_empty() {
            self.user_agent = DEFAULT_USER_AGENT.to_string();
        }
        if matches!(&self.download_directory, Some(dir) if dir.trim().is_empty()) {
            self.download_directory = None;
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Settings shared by the CLI and the cache, persisted on every update.
pub struct SettingsStore {
    path: PathBuf,
    settings: Mutex<DownloadSettings>,
}

impl SettingsStore {
    pub fn load(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            settings: Mutex::new(DownloadSettings::load(path)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DownloadSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a snapshot of current settings
    pub fn snapshot(&self) -> DownloadSettings {
        self.lock().clone()
    }

    /// Update settings and save to disk
    pub fn update<F>(&self, updater: F) -> Result<DownloadSettings, CacheError>
    where
        F: FnOnce(&mut DownloadSettings),
    {
        let mut settings = self.lock();
        updater(&mut settings);
        settings.validate();
        settings.save(&self.path)?;
        Ok(settings.clone())
    }

    pub fn set_download_directory(&self, location: impl Into<String>) -> Result<(), CacheError> {
        let location = location.into();
        self.update(|s| s.download_directory = Some(location))?;
        Ok(())
    }

    pub fn clear_download_directory(&self) -> Result<(), CacheError> {
        self.update(|s| s.download_directory = None)?;
        Ok(())
    }
}

impl LocationProvider for SettingsStore {
    fn configured_location(&self) -> Option<String> {
        self.lock().download_directory.clone()
    }
}
