// Application state: wires the engine components together
use std::sync::Arc;

use crate::api::ApiClient;
use crate::config::AppConfig;
use crate::download::DownloadManager;
use crate::error::Result;
use crate::model::{Quality, Song};
use crate::playback::{PlaybackEngine, PlaybackSession};
use crate::store::index::LocalIndex;
use crate::store::ContentStore;
use crate::transport::NowPlayingSink;

/// Owns the component graph: remote API client, content store and index,
/// download queue and the playback session.
///
/// Must be constructed inside a tokio runtime; the download worker and
/// playback tick run as background tasks.
pub struct AppState {
    pub config: AppConfig,
    pub api: ApiClient,
    pub store: Arc<ContentStore>,
    pub index: LocalIndex,
    pub downloads: DownloadManager,
    pub playback: PlaybackSession,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        engine: Arc<dyn PlaybackEngine>,
        sink: Arc<dyn NowPlayingSink>,
    ) -> Result<Self> {
        let api = ApiClient::new(config.api.base_url.clone());
        let store = Arc::new(ContentStore::new(config.storage.music_dir.clone()));
        store.ensure_root()?;

        let index = LocalIndex::open(&store)?;
        // Pick up files downloaded by older versions that predate the index.
        index.import_from_store(&store)?;

        let downloads = DownloadManager::new(api.clone(), Arc::clone(&store), index.clone());
        let playback = PlaybackSession::new(
            engine,
            Arc::clone(&store),
            api.clone(),
            sink,
            &config.playback,
        );

        Ok(Self {
            config,
            api,
            store,
            index,
            downloads,
            playback,
        })
    }

    /// Search the remote catalog, with `is_downloaded` derived from the
    /// Content Store for each result.
    pub async fn search(&self, query: &str) -> Result<Vec<Song>> {
        let songs = self.api.search(query).await?;
        Ok(songs
            .into_iter()
            .map(|song| {
                let is_downloaded = self.store.exists(&song);
                Song {
                    is_downloaded,
                    ..song
                }
            })
            .collect())
    }

    /// Songs available offline, reconstructed from the store directory.
    pub fn local_songs(&self) -> Vec<Song> {
        self.store.scan().collect()
    }

    /// Queue a song for download at the configured default quality.
    pub fn download(&self, song: &Song) -> bool {
        self.downloads
            .enqueue(song, self.config.downloads.default_quality)
    }

    /// Queue a song for download at an explicit quality tier.
    pub fn download_with_quality(&self, song: &Song, quality: Quality) -> bool {
        self.downloads.enqueue(song, quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::model::PlaybackSource;
    use async_trait::async_trait;
    use std::time::Duration;

    struct InertEngine;

    #[async_trait]
    impl PlaybackEngine for InertEngine {
        async fn load(&self, _source: &PlaybackSource) -> crate::error::Result<()> {
            Err(EngineError::Playback("inert".to_string()))
        }
        fn resume(&self) {}
        fn pause(&self) {}
        fn stop(&self) {}
        fn seek(&self, _position: Duration) {}
        fn position(&self) -> Duration {
            Duration::ZERO
        }
        fn duration(&self) -> Option<Duration> {
            None
        }
        fn at_end(&self) -> bool {
            false
        }
    }

    async fn app(server: &mockito::ServerGuard, dir: &tempfile::TempDir) -> AppState {
        let mut config = AppConfig::default();
        config.api.base_url = server.url();
        config.storage.music_dir = dir.path().to_path_buf();
        AppState::new(
            config,
            Arc::new(InertEngine),
            Arc::new(crate::transport::NullNowPlayingSink),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_marks_downloaded_results() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search?query=x")
            .with_status(200)
            .with_body(
                r#"{
                    "1": {"title": "B", "artist": "A", "thumbnailUrl": "", "duration": 10},
                    "2": {"title": "D", "artist": "C", "thumbnailUrl": "", "duration": 20}
                }"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1 - A - B.flac"), b"x").unwrap();

        let app = app(&server, &dir).await;
        let mut songs = app.search("x").await.unwrap();
        songs.sort_by(|a, b| a.id.cmp(&b.id));

        assert!(songs[0].is_downloaded);
        assert!(!songs[1].is_downloaded);
    }

    #[tokio::test]
    async fn test_new_imports_existing_files_into_index() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1 - A - B.flac"), b"x").unwrap();

        let app = app(&server, &dir).await;
        assert!(app.index.get("1").unwrap().is_some());
        assert_eq!(app.local_songs().len(), 1);
    }
}
