// Download queue management
// Serializes fetches against the remote API and persists results into the
// Content Store, one transfer at a time.

pub mod manager;

pub use manager::{DownloadEvent, DownloadManager, DownloadRequest, DownloadState};
