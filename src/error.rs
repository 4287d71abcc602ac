// Engine-wide error taxonomy
use thiserror::Error;

/// Errors surfaced by the playback and download engine.
///
/// No variant is fatal to the hosting process: download failures are local
/// to the failing queue item, playback resolution failures are surfaced via
/// the published session state, and telemetry failures are logged and
/// dropped at the call site.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no playable source for '{0}'")]
    Resolution(String),

    #[error("playback engine error: {0}")]
    Playback(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
