// Driftplay - playback and download coordination engine for a personal
// music client. Screens and navigation are the embedding application's
// concern; this crate owns the state, ordering and failure semantics.

// Module declarations
pub mod api;
pub mod config;
pub mod download;
pub mod error;
pub mod logging;
pub mod model;
pub mod playback;
pub mod state;
pub mod store;
pub mod transport;

pub use api::ApiClient;
pub use config::AppConfig;
pub use download::{DownloadEvent, DownloadManager, DownloadState};
pub use error::{EngineError, Result};
pub use model::{PlaybackSource, Quality, Song};
pub use playback::{
    PlaybackEngine, PlaybackSession, PlaybackSnapshot, PlaybackState, RodioEngine,
};
pub use state::AppState;
pub use store::index::LocalIndex;
pub use store::ContentStore;
pub use transport::{NowPlayingInfo, NowPlayingSink, NullNowPlayingSink, TransportCommand};
