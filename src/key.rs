use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Comparison-stable identity of a track inside the download folder.
///
/// Built from the same display name that is used as the file's base name, so a
/// key derived from track metadata and a key derived from a file written by the
/// download pipeline always agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Key for a track identified by artist, title and album.
    pub fn for_track(artist: &str, title: &str, album: &str) -> Self {
        Self::from_name(&display_name(artist, title, album))
    }

    /// Key for an arbitrary display name or file base name.
    pub fn from_name(name: &str) -> Self {
        CanonicalKey(normalize_for_comparison(name))
    }

    /// Key for a file found in the download folder (extension is stripped first).
    pub fn from_file_name(file_name: &str) -> Self {
        Self::from_name(base_name_of(file_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `"{artist} - {title} ({album})"`, dropping the artist and album parts when empty.
pub fn display_name(artist: &str, title: &str, album: &str) -> String {
    let mut name = if artist.is_empty() {
        title.to_string()
    } else {
        format!("{} - {}", artist, title)
    };
    if !album.is_empty() {
        name.push_str(" (");
        name.push_str(album);
        name.push(')');
    }
    name
}

/// Make a name safe to use as a file name on any volume the user may pick.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    collapse_whitespace(&replaced)
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Sanitize, decompose (NFKD), drop combining diacritics and lower-case.
pub fn normalize_for_comparison(name: &str) -> String {
    sanitize_file_name(name)
        .nfkd()
        .filter(|c| !is_combining_diacritic(*c))
        .collect::<String>()
        .to_lowercase()
}

// Combining Diacritical Marks block only; other combining marks are kept.
fn is_combining_diacritic(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Strip a trailing `.ext` segment. Names without one are returned unchanged.
pub fn base_name_of(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => &file_name[..idx],
        _ => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_drops_empty_parts() {
        assert_eq!(display_name("", "Intro", ""), "Intro");
        assert_eq!(display_name("Air", "La femme d'argent", ""), "Air - La femme d'argent");
        assert_eq!(display_name("", "Intro", "Live"), "Intro (Live)");
        assert_eq!(
            display_name("Daft Punk", "One More Time", "Discovery"),
            "Daft Punk - One More Time (Discovery)"
        );
    }

    #[test]
    fn sanitize_replaces_reserved_characters_and_collapses_spaces() {
        assert_eq!(sanitize_file_name("AC/DC: Live?  "), "AC_DC_ Live_");
        assert_eq!(sanitize_file_name("  a \t\n b  "), "a b");
        assert_eq!(sanitize_file_name(r#"x\y*z"<>|"#), "x_y_z____");
    }

    #[test]
    fn normalization_folds_case_and_diacritics() {
        assert_eq!(
            CanonicalKey::for_track("Beyoncé", "Déjà Vu", ""),
            CanonicalKey::for_track("BEYONCE", "deja vu", "")
        );
        assert_eq!(normalize_for_comparison("Ｆｕｌｌ"), "full");
    }

    #[test]
    fn base_name_strips_only_last_extension() {
        assert_eq!(base_name_of("song.mp3"), "song");
        assert_eq!(base_name_of("a.b.flac"), "a.b");
        assert_eq!(base_name_of("noext"), "noext");
        assert_eq!(base_name_of("trailing."), "trailing.");
    }

    #[test]
    fn key_survives_a_round_trip_through_a_file_name() {
        let samples = [
            ("Daft Punk", "One More Time", "Discovery"),
            ("", "Vol. 2", ""),
            ("Sigur Rós", "Hoppípolla", "Takk..."),
            ("AC/DC", "T.N.T.", "High Voltage"),
            ("  Spaced   Out ", "Title", ""),
            ("Mötley Crüe", "Kickstart My Heart", "Dr. Feelgood"),
        ];
        for (artist, title, album) in samples {
            let name = display_name(artist, title, album);
            let file_name = format!("{}.mp3", sanitize_file_name(&name));
            assert_eq!(
                CanonicalKey::from_file_name(&file_name),
                CanonicalKey::for_track(artist, title, album),
                "round trip failed for {file_name}"
            );
        }
    }
}
