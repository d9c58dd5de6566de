use crate::key::{display_name, sanitize_file_name, CanonicalKey};

const DEFAULT_BASE_NAME: &str = "download";
use serde::{Deserialize, Serialize};

/// A song or podcast episode as supplied by the streaming server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// File suffix reported by the server (`"flac"`, `"mp3"`, ...).
    #[serde(default)]
    pub suffix: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: Option<u32>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn artist_or_empty(&self) -> &str {
        self.artist.as_deref().unwrap_or("")
    }

    pub fn album_or_empty(&self) -> &str {
        self.album.as_deref().unwrap_or("")
    }

    /// Title, or the server id when the track has none.
    pub fn title_or_id(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.id,
        }
    }

    pub fn has_title(&self) -> bool {
        matches!(self.title.as_deref(), Some(t) if !t.trim().is_empty())
    }

    /// Sanitized base name of the file this track is stored under; never empty.
    pub fn file_base_name(&self) -> String {
        let name = display_name(self.artist_or_empty(), self.title_or_id(), self.album_or_empty());
        let base = sanitize_file_name(&name);
        if base.is_empty() {
            DEFAULT_BASE_NAME.to_string()
        } else {
            base
        }
    }

    /// Key of the file this track is stored under.
    pub fn key(&self) -> CanonicalKey {
        CanonicalKey::from_name(&self.file_base_name())
    }

    /// Non-empty suffix, without a leading dot.
    pub fn suffix(&self) -> Option<&str> {
        self.suffix
            .as_deref()
            .map(|s| s.trim_start_matches('.'))
            .filter(|s| !s.is_empty())
    }
}
