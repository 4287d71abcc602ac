// Content Store: directory-backed persistence for downloaded audio
//
// The store directory is the authoritative record of what is available
// offline. Files follow the naming convention "<id> - <artist> - <title>.flac"
// so a plain directory listing can be parsed back into songs.

pub mod index;

use lofty::prelude::AudioFile;
use lofty::probe::Probe;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::Result;
use crate::model::Song;

/// Audio extension for downloaded files
pub const AUDIO_EXTENSION: &str = "flac";

/// Delimiter between the id, artist and title components of a filename
const NAME_DELIMITER: &str = " - ";

pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the store directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Deterministic local path for a song: `"<id> - <artist> - <title>.flac"`.
    pub fn resolve_path(&self, song: &Song) -> PathBuf {
        self.resolve_path_parts(&song.id, &song.artist, &song.title)
    }

    pub fn resolve_path_parts(&self, id: &str, artist: &str, title: &str) -> PathBuf {
        self.root.join(format!(
            "{id}{NAME_DELIMITER}{artist}{NAME_DELIMITER}{title}.{AUDIO_EXTENSION}"
        ))
    }

    /// Whether the song is available offline.
    pub fn exists(&self, song: &Song) -> bool {
        self.resolve_path(song).is_file()
    }

    /// Lazily enumerate the songs available offline.
    ///
    /// Lists the store root (non-recursively), keeps `.flac` files whose
    /// stem parses into id/artist/title, and silently skips everything
    /// else. An unreadable or missing root yields an empty sequence. The
    /// listing is not cached; each call re-reads the directory.
    pub fn scan(&self) -> impl Iterator<Item = Song> + '_ {
        WalkDir::new(&self.root)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| song_from_path(e.path()))
    }
}

/// Parse a store file path back into a song, or None if the file does not
/// follow the store naming convention.
fn song_from_path(path: &Path) -> Option<Song> {
    let extension = path.extension()?.to_str()?;
    if !extension.eq_ignore_ascii_case(AUDIO_EXTENSION) {
        return None;
    }

    let stem = path.file_stem()?.to_str()?;
    let (id, artist, title) = parse_file_stem(stem)?;

    Some(Song {
        id: id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        thumbnail_url: String::new(),
        duration: 0,
        is_downloaded: true,
    })
}

/// Split a filename stem into `(id, artist, title)`.
///
/// The first two delimiters are significant; the title keeps any further
/// `" - "` occurrences. Stems without exactly three non-empty components
/// are rejected.
fn parse_file_stem(stem: &str) -> Option<(&str, &str, &str)> {
    let mut parts = stem.splitn(3, NAME_DELIMITER);
    let id = parts.next()?;
    let artist = parts.next()?;
    let title = parts.next()?;

    if id.is_empty() || artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((id, artist, title))
}

/// Best-effort duration probe for a local audio file, in whole seconds.
pub(crate) fn probe_duration(path: &Path) -> Option<u32> {
    let probe = Probe::open(path).ok()?.guess_file_type().ok()?;
    match probe.read() {
        Ok(file) => Some(file.properties().duration().as_secs() as u32),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to probe duration");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store_with_files(names: &[&str]) -> (tempfile::TempDir, ContentStore) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(name), b"flac-bytes").unwrap();
        }
        let store = ContentStore::new(dir.path());
        (dir, store)
    }

    fn song(id: &str, artist: &str, title: &str) -> Song {
        Song {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            thumbnail_url: String::new(),
            duration: 0,
            is_downloaded: false,
        }
    }

    #[test]
    fn test_resolve_path_convention() {
        let store = ContentStore::new("/music");
        let path = store.resolve_path(&song("42", "Artist", "Title"));
        assert_eq!(path, PathBuf::from("/music/42 - Artist - Title.flac"));
    }

    #[test]
    fn test_exists_tracks_file_presence() {
        let (_dir, store) = store_with_files(&["42 - Artist - Title.flac"]);
        assert!(store.exists(&song("42", "Artist", "Title")));
        assert!(!store.exists(&song("43", "Artist", "Title")));
    }

    #[test]
    fn test_scan_parses_conforming_names() {
        let (_dir, store) = store_with_files(&["42 - Artist - Title.flac"]);
        let songs: Vec<Song> = store.scan().collect();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].id, "42");
        assert_eq!(songs[0].artist, "Artist");
        assert_eq!(songs[0].title, "Title");
        assert!(songs[0].is_downloaded);
        assert_eq!(songs[0].duration, 0);
        assert_eq!(songs[0].thumbnail_url, "");
    }

    #[test]
    fn test_scan_skips_malformed_names() {
        let (_dir, store) = store_with_files(&[
            "bad-name.flac",
            "only - two.flac",
            "notes.txt",
            "1 - A - B.flac",
        ]);
        let ids: Vec<String> = store.scan().map(|s| s.id).collect();
        assert_eq!(ids, vec!["1".to_string()]);
    }

    #[test]
    fn test_scan_title_keeps_extra_delimiters() {
        let (_dir, store) = store_with_files(&["9 - Artist - Part 1 - Part 2.flac"]);
        let songs: Vec<Song> = store.scan().collect();
        assert_eq!(songs[0].title, "Part 1 - Part 2");
        assert_eq!(songs[0].artist, "Artist");
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let store = ContentStore::new("/definitely/not/a/real/dir");
        assert_eq!(store.scan().count(), 0);
    }

    #[test]
    fn test_scan_is_restartable() {
        let (_dir, store) = store_with_files(&["1 - A - B.flac", "2 - C - D.flac"]);
        assert_eq!(store.scan().count(), 2);
        assert_eq!(store.scan().count(), 2);
    }
}
