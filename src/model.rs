// Core value types shared across the engine
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A catalog song.
///
/// Immutable value record: instances come from a catalog search or from a
/// Content Store scan. `is_downloaded` is derived from store presence when
/// the record is built and is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub thumbnail_url: String,
    /// Duration in seconds, 0 if unknown.
    pub duration: u32,
    pub is_downloaded: bool,
}

/// Requested encoding tier for a stream or download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Lossless,
    Compressed,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Lossless => "lossless",
            Quality::Compressed => "compressed",
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Lossless
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the playback engine reads audio from, chosen deterministically
/// from song identity and Content Store presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    Local(PathBuf),
    Remote(String),
}
