use once_cell::sync::Lazy;
use std::collections::HashMap;

static EXTENSIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("audio/mpeg", "mp3"),
        ("audio/mp3", "mp3"),
        ("audio/mpeg3", "mp3"),
        ("audio/x-mpeg", "mp3"),
        ("audio/mp4", "m4a"),
        ("audio/x-m4a", "m4a"),
        ("audio/m4a", "m4a"),
        ("audio/aac", "aac"),
        ("audio/aacp", "aac"),
        ("audio/x-aac", "aac"),
        ("audio/flac", "flac"),
        ("audio/x-flac", "flac"),
        ("audio/ogg", "ogg"),
        ("audio/vorbis", "ogg"),
        ("audio/opus", "opus"),
        ("audio/wav", "wav"),
        ("audio/wave", "wav"),
        ("audio/x-wav", "wav"),
        ("audio/webm", "weba"),
        ("audio/x-ms-wma", "wma"),
        ("audio/aiff", "aif"),
        ("audio/x-aiff", "aif"),
        ("audio/x-matroska", "mka"),
        ("audio/3gpp", "3gp"),
        ("audio/amr", "amr"),
        ("audio/midi", "mid"),
        ("video/mp4", "mp4"),
        ("video/webm", "webm"),
        ("application/ogg", "ogx"),
    ])
});

/// Extension registered for a `Content-Type` value, ignoring parameters and case.
/// Generic types such as `application/octet-stream` have none.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() {
        return None;
    }
    EXTENSIONS.get(essence.as_str()).copied()
}
