// Sequential download worker with push-based progress reporting
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::Result;
use crate::model::{Quality, Song};
use crate::store::index::{LocalIndex, TrackRecord};
use crate::store::ContentStore;

/// One queued download. Requests are processed strictly in arrival order.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub song: Song,
    pub quality: Quality,
}

/// Current state of the download pipeline, published through a watch
/// channel. At most one transfer is active at any instant.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    /// Nothing queued or in flight; also re-published when the queue drains.
    Idle,
    Downloading { id: String, progress: f32 },
    Completed { id: String },
    Failed { id: String, reason: String },
}

/// Ordered notifications for observers that need the full history rather
/// than the latest snapshot (the watch channel coalesces).
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Started { id: String },
    Progress { id: String, progress: f32 },
    Completed { id: String },
    Failed { id: String, reason: String },
}

/// Serializes downloads through a single long-lived worker task.
///
/// The single consumer guarantees FIFO completion order and the
/// at-most-one-transfer invariant structurally; there is no way for two
/// requests to be in flight at once. Failures are local to the failing
/// item: the worker logs, reports, and moves on. No automatic retry.
pub struct DownloadManager {
    queue_tx: mpsc::UnboundedSender<DownloadRequest>,
    state_rx: watch::Receiver<DownloadState>,
    events_tx: broadcast::Sender<DownloadEvent>,
    pending: Arc<Mutex<HashSet<String>>>,
    shutdown: CancellationToken,
}

impl DownloadManager {
    pub fn new(api: ApiClient, store: Arc<ContentStore>, index: LocalIndex) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(DownloadState::Idle);
        let (events_tx, _) = broadcast::channel(256);
        let pending = Arc::new(Mutex::new(HashSet::new()));
        let shutdown = CancellationToken::new();

        let worker = Worker {
            api,
            store,
            index,
            state_tx,
            events_tx: events_tx.clone(),
            pending: Arc::clone(&pending),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(worker.run(queue_rx));

        Self {
            queue_tx,
            state_rx,
            events_tx,
            pending,
            shutdown,
        }
    }

    /// Append a download request to the tail of the queue.
    ///
    /// An id that is already queued or in flight is skipped; returns
    /// whether the request was actually enqueued.
    pub fn enqueue(&self, song: &Song, quality: Quality) -> bool {
        {
            let mut pending = self.pending.lock().unwrap();
            if !pending.insert(song.id.clone()) {
                debug!(id = %song.id, "already queued or in flight, skipping");
                return false;
            }
        }

        let request = DownloadRequest {
            song: song.clone(),
            quality,
        };
        if self.queue_tx.send(request).is_err() {
            warn!(id = %song.id, "download worker is gone, dropping request");
            self.pending.lock().unwrap().remove(&song.id);
            return false;
        }
        true
    }

    /// Latest pipeline state.
    pub fn current(&self) -> DownloadState {
        self.state_rx.borrow().clone()
    }

    /// Watch the pipeline state. Intermediate values may be coalesced;
    /// use [`DownloadManager::events`] for the full sequence.
    pub fn subscribe(&self) -> watch::Receiver<DownloadState> {
        self.state_rx.clone()
    }

    /// Ordered download notifications.
    pub fn events(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events_tx.subscribe()
    }

    /// Whether the id is queued or currently transferring.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().unwrap().contains(id)
    }

    /// Stop the worker task. In-queue requests are dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

struct Worker {
    api: ApiClient,
    store: Arc<ContentStore>,
    index: LocalIndex,
    state_tx: watch::Sender<DownloadState>,
    events_tx: broadcast::Sender<DownloadEvent>,
    pending: Arc<Mutex<HashSet<String>>>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self, mut queue_rx: mpsc::UnboundedReceiver<DownloadRequest>) {
        loop {
            let request = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                request = queue_rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let id = request.song.id.clone();
            match self.transfer(&request).await {
                Ok(path) => {
                    info!(%id, path = %path.display(), "download completed");
                    self.record_completed(&request, &path).await;
                    self.publish(DownloadState::Completed { id });
                }
                Err(e) => {
                    warn!(%id, error = %e, "download failed");
                    self.publish(DownloadState::Failed {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
            self.pending.lock().unwrap().remove(&request.song.id);
            // Quiescent pipeline is observable as Idle; the terminal state
            // for each item stays available on the event channel.
            if queue_rx.is_empty() {
                self.publish(DownloadState::Idle);
            }
        }
        debug!("download worker stopped");
    }

    /// Run one transfer end to end. The payload streams into a temporary
    /// file which is atomically renamed over the final path on success, so
    /// concurrent readers never observe a half-written file and a failed
    /// replacement keeps any previously downloaded copy intact.
    async fn transfer(&self, request: &DownloadRequest) -> Result<PathBuf> {
        self.store.ensure_root()?;
        let final_path = self.store.resolve_path(&request.song);
        let temp_path = part_path(&final_path);

        let result = self.fetch_and_persist(request, &temp_path, &final_path).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }
        result.map(|_| final_path)
    }

    async fn fetch_and_persist(
        &self,
        request: &DownloadRequest,
        temp_path: &Path,
        final_path: &Path,
    ) -> Result<()> {
        let id = &request.song.id;
        self.publish(DownloadState::Downloading {
            id: id.clone(),
            progress: 0.0,
        });

        let response = self.api.download(id, request.quality).await?;
        // Unknown expected size reports progress 0 until the transfer ends.
        let expected = response.content_length().filter(|len| *len > 0);
        let mut received: u64 = 0;

        let mut file = tokio::fs::File::create(temp_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            if let Some(expected) = expected {
                let progress = (received as f32 / expected as f32).clamp(0.0, 1.0);
                self.publish(DownloadState::Downloading {
                    id: id.clone(),
                    progress,
                });
            }
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(temp_path, final_path).await?;
        make_readable(final_path)?;
        Ok(())
    }

    /// Record the finished download in the local index, probing the file
    /// duration best-effort.
    async fn record_completed(&self, request: &DownloadRequest, path: &Path) {
        let probe_path = path.to_path_buf();
        let duration_secs = tokio::task::spawn_blocking(move || {
            crate::store::probe_duration(&probe_path)
        })
        .await
        .ok()
        .flatten()
        .unwrap_or(0);

        let record = TrackRecord {
            id: request.song.id.clone(),
            path: path.to_string_lossy().to_string(),
            title: request.song.title.clone(),
            artist: request.song.artist.clone(),
            duration_secs,
            added_at: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.index.upsert(&record) {
            warn!(id = %record.id, error = %e, "failed to index download");
        }
    }

    fn publish(&self, state: DownloadState) {
        let event = match &state {
            DownloadState::Idle => None,
            DownloadState::Downloading { id, progress } => {
                if *progress == 0.0 {
                    Some(DownloadEvent::Started { id: id.clone() })
                } else {
                    Some(DownloadEvent::Progress {
                        id: id.clone(),
                        progress: *progress,
                    })
                }
            }
            DownloadState::Completed { id } => Some(DownloadEvent::Completed { id: id.clone() }),
            DownloadState::Failed { id, reason } => Some(DownloadEvent::Failed {
                id: id.clone(),
                reason: reason.clone(),
            }),
        };

        let _ = self.state_tx.send(state);
        if let Some(event) = event {
            let _ = self.events_tx.send(event);
        }
    }
}

/// Temporary path used while a transfer is in flight:
/// `"<id> - <artist> - <title>.flac.part"`.
fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(unix)]
fn make_readable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_readable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> Song {
        Song {
            id: id.to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            thumbnail_url: String::new(),
            duration: 0,
            is_downloaded: false,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<ContentStore>,
        index: LocalIndex,
        manager: DownloadManager,
        server: mockito::ServerGuard,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContentStore::new(dir.path()));
        let index = LocalIndex::open(&store).unwrap();
        let server = mockito::Server::new_async().await;
        let api = ApiClient::new(server.url());
        let manager = DownloadManager::new(api, Arc::clone(&store), index.clone());
        Fixture {
            _dir: dir,
            store,
            index,
            manager,
            server,
        }
    }

    async fn mock_download(
        server: &mut mockito::ServerGuard,
        id: &str,
        body: &[u8],
    ) -> mockito::Mock {
        server
            .mock("GET", format!("/download?id={id}&quality=lossless").as_str())
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    /// Collect events until every id in `terminal` has completed or failed.
    async fn collect_until_drained(
        mut events: broadcast::Receiver<DownloadEvent>,
        terminal: usize,
    ) -> Vec<DownloadEvent> {
        let mut seen = Vec::new();
        let mut done = 0;
        while done < terminal {
            let event = tokio::time::timeout(std::time::Duration::from_secs(10), events.recv())
                .await
                .expect("timed out waiting for download events")
                .expect("event channel closed");
            if matches!(
                event,
                DownloadEvent::Completed { .. } | DownloadEvent::Failed { .. }
            ) {
                done += 1;
            }
            seen.push(event);
        }
        seen
    }

    #[tokio::test]
    async fn test_completed_download_is_visible_in_scan_and_index() {
        let mut fx = fixture().await;
        let mock = mock_download(&mut fx.server, "X", b"payload-bytes").await;
        let events = fx.manager.events();

        assert!(fx.manager.enqueue(&song("X"), Quality::Lossless));
        let seen = collect_until_drained(events, 1).await;
        mock.assert_async().await;

        assert!(matches!(seen.last(), Some(DownloadEvent::Completed { id }) if id == "X"));
        let path = fx.store.resolve_path(&song("X"));
        assert_eq!(std::fs::read(&path).unwrap(), b"payload-bytes");

        let scanned: Vec<Song> = fx.store.scan().collect();
        assert!(scanned.iter().any(|s| s.id == "X" && s.is_downloaded));
        assert!(fx.index.get("X").unwrap().is_some());
        assert!(!fx.manager.is_pending("X"));
    }

    #[tokio::test]
    async fn test_fifo_order_second_item_waits_for_first() {
        let mut fx = fixture().await;
        mock_download(&mut fx.server, "a", &[1u8; 64 * 1024]).await;
        mock_download(&mut fx.server, "b", b"bbbb").await;
        let events = fx.manager.events();

        assert!(fx.manager.enqueue(&song("a"), Quality::Lossless));
        assert!(fx.manager.enqueue(&song("b"), Quality::Lossless));
        let seen = collect_until_drained(events, 2).await;

        let started_b = seen
            .iter()
            .position(|e| matches!(e, DownloadEvent::Started { id } if id == "b"))
            .expect("b never started");
        let completed_a = seen
            .iter()
            .position(|e| matches!(e, DownloadEvent::Completed { id } if id == "a"))
            .expect("a never completed");
        assert!(
            completed_a < started_b,
            "b started before a finished: {seen:?}"
        );
    }

    #[tokio::test]
    async fn test_failure_marks_item_and_queue_drains() {
        let mut fx = fixture().await;
        fx.server
            .mock("GET", "/download?id=a&quality=lossless")
            .with_status(500)
            .create_async()
            .await;
        mock_download(&mut fx.server, "b", b"bbbb").await;
        let events = fx.manager.events();

        fx.manager.enqueue(&song("a"), Quality::Lossless);
        fx.manager.enqueue(&song("b"), Quality::Lossless);
        let seen = collect_until_drained(events, 2).await;

        assert!(seen
            .iter()
            .any(|e| matches!(e, DownloadEvent::Failed { id, .. } if id == "a")));
        assert!(seen
            .iter()
            .any(|e| matches!(e, DownloadEvent::Completed { id } if id == "b")));

        // No file, partial or final, for the failed item.
        assert!(!fx.store.resolve_path(&song("a")).exists());
        assert!(!part_path(&fx.store.resolve_path(&song("a"))).exists());
        assert!(fx.store.resolve_path(&song("b")).exists());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_within_bounds() {
        let mut fx = fixture().await;
        mock_download(&mut fx.server, "X", &[7u8; 256 * 1024]).await;
        let events = fx.manager.events();

        fx.manager.enqueue(&song("X"), Quality::Lossless);
        let seen = collect_until_drained(events, 1).await;

        let mut last = 0.0f32;
        for event in &seen {
            if let DownloadEvent::Progress { progress, .. } = event {
                assert!(*progress >= 0.0 && *progress <= 1.0);
                assert!(*progress >= last, "progress went backwards: {seen:?}");
                last = *progress;
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_skipped() {
        let mut fx = fixture().await;
        mock_download(&mut fx.server, "X", b"payload").await;

        assert!(fx.manager.enqueue(&song("X"), Quality::Lossless));
        assert!(!fx.manager.enqueue(&song("X"), Quality::Lossless));

        let seen = collect_until_drained(fx.manager.events(), 1).await;
        let completions = seen
            .iter()
            .filter(|e| matches!(e, DownloadEvent::Completed { .. }))
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn test_state_returns_to_idle_when_queue_drains() {
        let mut fx = fixture().await;
        mock_download(&mut fx.server, "X", b"payload").await;
        let events = fx.manager.events();

        fx.manager.enqueue(&song("X"), Quality::Lossless);
        let seen = collect_until_drained(events, 1).await;
        assert!(matches!(seen.last(), Some(DownloadEvent::Completed { .. })));

        let mut states = fx.manager.subscribe();
        tokio::time::timeout(
            std::time::Duration::from_secs(10),
            states.wait_for(|state| *state == DownloadState::Idle),
        )
        .await
        .expect("timed out waiting for idle")
        .expect("state channel closed");
    }

    #[tokio::test]
    async fn test_successful_replace_overwrites_previous_file() {
        let mut fx = fixture().await;
        let path = fx.store.resolve_path(&song("X"));
        fx.store.ensure_root().unwrap();
        std::fs::write(&path, b"old-contents").unwrap();

        mock_download(&mut fx.server, "X", b"new-contents").await;
        let events = fx.manager.events();
        fx.manager.enqueue(&song("X"), Quality::Lossless);
        collect_until_drained(events, 1).await;

        assert_eq!(std::fs::read(&path).unwrap(), b"new-contents");
    }
}
