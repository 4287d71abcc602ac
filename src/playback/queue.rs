// Explicit ordered play queue
//
// A queue always backs the session, even for a single song, so next/previous
// have defined semantics instead of being inert stubs.
use crate::model::Song;

#[derive(Debug, Default)]
pub struct PlayQueue {
    songs: Vec<Song>,
    position: usize,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue contents. `start` is clamped into the new queue;
    /// returns the song playback should start with.
    pub fn replace(&mut self, songs: Vec<Song>, start: usize) -> Option<&Song> {
        self.songs = songs;
        self.position = start.min(self.songs.len().saturating_sub(1));
        self.current()
    }

    pub fn current(&self) -> Option<&Song> {
        self.songs.get(self.position)
    }

    /// Step to the next song, or None (unchanged) at the tail.
    pub fn advance(&mut self) -> Option<&Song> {
        if self.position + 1 < self.songs.len() {
            self.position += 1;
            self.current()
        } else {
            None
        }
    }

    /// Step to the previous song, or None (unchanged) at the head.
    pub fn retreat(&mut self) -> Option<&Song> {
        if self.position > 0 && !self.songs.is_empty() {
            self.position -= 1;
            self.current()
        } else {
            None
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}
