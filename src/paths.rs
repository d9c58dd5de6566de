use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "trackvault";

/// Path layout for the application's own state (not the download folder)
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PathConfig {
    /// Base directories
    pub app_data_dir: PathBuf,
    pub app_config_dir: PathBuf,
    pub app_log_dir: PathBuf,

    /// Download ledger index
    pub ledger_file: PathBuf,

    /// Persisted download settings
    pub settings_file: PathBuf,

    /// Log files
    pub logs: LogPaths,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LogPaths {
    pub backend_logs: PathBuf,
    pub backend_errors: PathBuf,
}

impl PathConfig {
    /// Platform directories, or everything under `root` when given
    pub fn new(root: Option<&Path>) -> Result<Self, CacheError> {
        let (app_data_dir, app_config_dir) = match root {
            Some(root) => (root.join("data"), root.join("config")),
            None => {
                let data = dirs::data_dir().ok_or_else(|| {
                    CacheError::Settings("Failed to get system data directory".to_string())
                })?;
                let config = dirs::config_dir().ok_or_else(|| {
                    CacheError::Settings("Failed to get system config directory".to_string())
                })?;
                (data.join(APP_DIR_NAME), config.join(APP_DIR_NAME))
            }
        };
        let app_log_dir = match root {
            Some(root) => root.join("logs"),
            None => app_data_dir.join("logs"),
        };

        let logs = LogPaths {
            backend_logs: app_log_dir.join("backend_logs.txt"),
            backend_errors: app_log_dir.join("backend_errors.txt"),
        };

        let config = PathConfig {
            ledger_file: app_data_dir.join("external_downloads.json"),
            settings_file: app_config_dir.join("settings.json"),
            app_data_dir,
            app_config_dir,
            app_log_dir,
            logs,
        };

        config.ensure_directories_exist()?;

        Ok(config)
    }

    /// Ensure all necessary directories exist
    pub fn ensure_directories_exist(&self) -> Result<(), CacheError> {
        for dir in [&self.app_data_dir, &self.app_config_dir, &self.app_log_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CacheError::Settings(format!(
                        "Failed to create directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get a JSON representation of the path configuration
    pub fn to_json(&self) -> Result<String, CacheError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CacheError::Settings(format!("Failed to serialize path config: {}", e)))
    }
}
