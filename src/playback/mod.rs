// Playback session management
// Single-active-track state machine, engine seam and explicit play queue.

pub mod engine;
pub mod queue;
pub mod session;

pub use engine::{PlaybackEngine, RodioEngine};
pub use queue::PlayQueue;
pub use session::{PlaybackSession, PlaybackSnapshot, PlaybackState};
