use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Source of the user-selected download folder.
///
/// The identifier is opaque to the cache: it is only compared for equality to
/// decide whether the folder has changed since the last reconciliation.
pub trait LocationProvider: Send + Sync {
    fn configured_location(&self) -> Option<String>;
}

/// Location held in memory, replaced on reconfiguration.
#[derive(Debug, Default)]
pub struct FixedLocation {
    current: Mutex<Option<String>>,
}

impl FixedLocation {
    pub fn new(location: Option<String>) -> Self {
        Self {
            current: Mutex::new(location),
        }
    }

    pub fn set(&self, location: impl Into<String>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(location.into());
    }

    pub fn clear(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl LocationProvider for FixedLocation {
    fn configured_location(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Map a location identifier to a local directory.
///
/// Accepts `file://` URIs (percent-decoded, optional `localhost` authority) and
/// plain paths. Other URI schemes have no local directory and yield `None`.
pub fn resolve_location(identifier: &str) -> Option<PathBuf> {
    let value = identifier.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(rest) = value.strip_prefix("file://") {
        let rest = rest.strip_prefix("localhost").unwrap_or(rest);
        let decoded = urlencoding::decode(rest).ok()?;
        if decoded.is_empty() {
            return None;
        }
        return Some(PathBuf::from(decoded.into_owned()));
    }

    // Anything that looks like "scheme://..." but isn't a file URI.
    if let Some((scheme, _)) = value.split_once("://") {
        if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return None;
        }
    }

    Some(PathBuf::from(value))
}

/// `file://` URI for a local directory, the inverse of [`resolve_location`].
pub fn location_for_path(path: &std::path::Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let encoded: Vec<String> = normalized
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let joined = encoded.join("/");
    if joined.starts_with('/') {
        format!("file://{}", joined)
    } else {
        format!("file:///{}", joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn resolves_plain_paths_and_file_uris() {
        assert_eq!(resolve_location("/music/dl"), Some(PathBuf::from("/music/dl")));
        assert_eq!(
            resolve_location("file:///music/My%20Songs"),
            Some(PathBuf::from("/music/My Songs"))
        );
        assert_eq!(
            resolve_location("file://localhost/music"),
            Some(PathBuf::from("/music"))
        );
    }

    #[test]
    fn rejects_empty_and_foreign_schemes() {
        assert_eq!(resolve_location("   "), None);
        assert_eq!(resolve_location("content://com.android.externalstorage/tree/x"), None);
        assert_eq!(resolve_location("file://"), None);
    }

    #[test]
    fn path_round_trips_through_uri() {
        let path = Path::new("/music/Épica & Friends/dl");
        let uri = location_for_path(path);
        assert!(uri.starts_with("file:///music/"));
        assert_eq!(resolve_location(&uri), Some(path.to_path_buf()));
    }

    #[test]
    fn fixed_location_can_be_replaced_and_cleared() {
        let loc = FixedLocation::new(None);
        assert_eq!(loc.configured_location(), None);
        loc.set("/a");
        assert_eq!(loc.configured_location().as_deref(), Some("/a"));
        loc.clear();
        assert_eq!(loc.configured_location(), None);
    }
}
