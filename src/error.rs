use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reconciling the download folder or running a download.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no download folder is configured")]
    Unconfigured,
    #[error("cannot read download folder {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write to download folder {}", path.display())]
    Unwritable { path: PathBuf },
    #[error("invalid source: {0}")]
    InvalidSource(String),
    #[error("server returned {status}")]
    Server { status: u16 },
    #[error("server sent an empty body")]
    EmptyTransfer,
    #[error("incomplete transfer: expected {expected} bytes, wrote {written}")]
    IncompleteTransfer { expected: u64, written: u64 },
    #[error("timed out {0}")]
    Timeout(&'static str),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings error: {0}")]
    Settings(String),
}

impl CacheError {
    /// Short text shown in the terminal failure notification.
    pub fn user_message(&self) -> String {
        match self {
            CacheError::Unconfigured => "No download folder set".to_string(),
            CacheError::Unreadable { .. } | CacheError::Unwritable { .. } => {
                "Cannot write to folder.".to_string()
            }
            CacheError::InvalidSource(reason) => reason.clone(),
            CacheError::Server { status } => format!("Server returned {}", status),
            CacheError::EmptyTransfer => "Empty download.".to_string(),
            CacheError::IncompleteTransfer { .. } => "Incomplete download.".to_string(),
            CacheError::Timeout(_) => "Download timed out.".to_string(),
            CacheError::Transport(e) => e.to_string(),
            CacheError::Io(e) => e.to_string(),
            CacheError::Settings(msg) => msg.clone(),
        }
    }
}
