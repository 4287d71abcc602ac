// External transport control surface
// OS-level media controls consume the published now-playing record and
// deliver inbound commands back into the playback session.

#[cfg(windows)]
pub mod smtc;

/// Projection of the active song and playback state for the transport
/// surface. Recomputed on every tick and state transition, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    /// Elapsed playback time in seconds.
    pub elapsed: f64,
    /// Total duration in seconds, 0 if unknown.
    pub duration: f64,
    /// 1.0 while playing, 0.0 otherwise.
    pub playback_rate: f64,
    pub artwork: Option<Vec<u8>>,
}

/// Outbound half of the transport binding. Injected into the playback
/// session so tests can substitute a recording double.
pub trait NowPlayingSink: Send + Sync {
    fn publish(&self, info: &NowPlayingInfo);

    /// Called when the session tears down with no active song.
    fn cleared(&self) {}
}

/// Inbound commands from the transport surface. Delivered over a channel
/// and marshaled onto the session's own update path; the surface may call
/// from any execution context.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    SeekTo(f64),
    Next,
    Previous,
}

/// Sink for hosts without an OS media-control surface.
pub struct NullNowPlayingSink;

impl NowPlayingSink for NullNowPlayingSink {
    fn publish(&self, _info: &NowPlayingInfo) {}
}
