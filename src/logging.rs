use crate::error::CacheError;
use crate::paths::LogPaths;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Overrides the default filter, e.g. `TRACKVAULT_LOG=trackvault=debug`.
pub const LOG_ENV: &str = "TRACKVAULT_LOG";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Install the global subscriber: stderr, the backend log file, and a second
/// file that only receives warnings and errors.
pub fn init(paths: &LogPaths, verbose: bool) -> Result<(), CacheError> {
    let log_file = open_append(&paths.backend_logs)?;
    let error_file = open_append(&paths.backend_errors)?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string())),
        )
        .with(
            fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string())),
        )
        .with(
            fmt::layer()
                .with_writer(Mutex::new(error_file).with_max_level(Level::WARN))
                .with_ansi(false)
                .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string())),
        )
        .try_init();
    if let Err(e) = installed {
        tracing::debug!(error = %e, "logger already installed");
        return Ok(());
    }

    tracing::info!(
        log = %paths.backend_logs.display(),
        errors = %paths.backend_errors.display(),
        "logger initialized"
    );
    Ok(())
}

fn open_append(path: &Path) -> Result<File, CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CacheError::Settings(format!("Failed to create log directory: {}", e))
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            CacheError::Settings(format!("Cannot write to log file {}: {}", path.display(), e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_init_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let paths = LogPaths {
            backend_logs: dir.path().join("backend_logs.txt"),
            backend_errors: dir.path().join("backend_errors.txt"),
        };
        init(&paths, false).unwrap();
        init(&paths, true).unwrap();
        assert!(paths.backend_errors.is_file());
    }

    #[test]
    fn log_files_are_created_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("backend_logs.txt");
        open_append(&path).unwrap();
        assert!(path.is_file());
    }
}
