// Playback session state machine
//
// Owns the single active engine instance. All state mutation funnels
// through one mutex: timer ticks, transport commands and direct calls all
// take the same lock before touching the session, so observers never see
// a torn transition.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::model::{PlaybackSource, Quality, Song};
use crate::playback::engine::PlaybackEngine;
use crate::playback::queue::PlayQueue;
use crate::store::ContentStore;
use crate::transport::{NowPlayingInfo, NowPlayingSink, TransportCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Resolving,
    Playing,
    Paused,
    /// Transient: natural end of media, immediately followed by `Paused`
    /// with the position rewound to zero.
    Ended,
}

/// Observable session state, published through a watch channel on every
/// transition and tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub song: Option<Song>,
    /// Seconds into the current track, within `[0, duration]`.
    pub current_time: f64,
    /// Track duration in seconds, 0 if unknown.
    pub duration: f64,
    /// `current_time / duration` clamped to `[0, 1]`, 0 when duration is 0.
    pub progress: f64,
}

impl PlaybackSnapshot {
    fn idle() -> Self {
        Self {
            state: PlaybackState::Idle,
            song: None,
            current_time: 0.0,
            duration: 0.0,
            progress: 0.0,
        }
    }
}

struct SessionInner {
    state: PlaybackState,
    queue: PlayQueue,
    current_time: f64,
    duration: f64,
    /// Bumped on every new track start; async side effects (artwork
    /// fetches) compare against it and drop their result when stale.
    generation: u64,
    tick_token: Option<CancellationToken>,
}

struct SessionCtx {
    inner: Mutex<SessionInner>,
    engine: Arc<dyn PlaybackEngine>,
    store: Arc<ContentStore>,
    api: ApiClient,
    sink: Arc<dyn NowPlayingSink>,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,
    snapshot_rx: watch::Receiver<PlaybackSnapshot>,
    tick_interval: Duration,
    stream_quality: Quality,
}

/// Single-active-track playback coordinator.
///
/// Cheap to clone; all clones share the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    ctx: Arc<SessionCtx>,
}

impl PlaybackSession {
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        store: Arc<ContentStore>,
        api: ApiClient,
        sink: Arc<dyn NowPlayingSink>,
        config: &PlaybackConfig,
    ) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(PlaybackSnapshot::idle());
        Self {
            ctx: Arc::new(SessionCtx {
                inner: Mutex::new(SessionInner {
                    state: PlaybackState::Idle,
                    queue: PlayQueue::new(),
                    current_time: 0.0,
                    duration: 0.0,
                    generation: 0,
                    tick_token: None,
                }),
                engine,
                store,
                api,
                sink,
                snapshot_tx,
                snapshot_rx,
                tick_interval: Duration::from_millis(config.tick_interval_ms),
                stream_quality: config.stream_quality,
            }),
        }
    }

    /// Play a single song, replacing the queue. `query` is the originating
    /// search query, reported as telemetry on every start; pass "" when
    /// there is none.
    pub async fn play_song(&self, song: Song, query: &str) -> Result<()> {
        let mut inner = self.ctx.inner.lock().await;
        inner.queue.replace(vec![song], 0);
        self.start_current(&mut inner, query).await
    }

    /// Play an ordered queue of songs starting at `start`.
    pub async fn play_queue(&self, songs: Vec<Song>, start: usize) -> Result<()> {
        let mut inner = self.ctx.inner.lock().await;
        if inner.queue.replace(songs, start).is_none() {
            return Ok(());
        }
        self.start_current(&mut inner, "").await
    }

    /// Resume from `Paused`; ignored in any other state. The position is
    /// left untouched.
    pub async fn resume(&self) {
        let mut inner = self.ctx.inner.lock().await;
        if inner.state != PlaybackState::Paused {
            debug!(state = ?inner.state, "resume ignored");
            return;
        }
        self.ctx.engine.resume();
        inner.state = PlaybackState::Playing;
        self.spawn_tick(&mut inner);
        self.publish(&inner);
    }

    /// Pause from `Playing`; ignored in any other state.
    pub async fn pause(&self) {
        let mut inner = self.ctx.inner.lock().await;
        if inner.state != PlaybackState::Playing {
            debug!(state = ?inner.state, "pause ignored");
            return;
        }
        self.ctx.engine.pause();
        self.cancel_tick(&mut inner);
        inner.state = PlaybackState::Paused;
        self.publish(&inner);
    }

    /// Seek to `seconds`, clamped into `[0, duration]`. Valid in any state
    /// and does not change Playing/Paused. With an unknown duration only
    /// the lower bound is enforceable; the target passes through and the
    /// engine handles overshoot.
    pub async fn seek(&self, seconds: f64) {
        let mut inner = self.ctx.inner.lock().await;
        let target = if inner.duration > 0.0 {
            seconds.clamp(0.0, inner.duration)
        } else {
            seconds.max(0.0)
        };
        self.ctx.engine.seek(Duration::from_secs_f64(target));
        inner.current_time = target;
        self.publish(&inner);
    }

    /// Start the next song in the queue. Returns false (and changes
    /// nothing) at the queue tail.
    pub async fn next_track(&self) -> Result<bool> {
        let mut inner = self.ctx.inner.lock().await;
        if inner.queue.advance().is_none() {
            return Ok(false);
        }
        self.start_current(&mut inner, "").await?;
        Ok(true)
    }

    /// Start the previous song in the queue. Returns false (and changes
    /// nothing) at the queue head.
    pub async fn previous_track(&self) -> Result<bool> {
        let mut inner = self.ctx.inner.lock().await;
        if inner.queue.retreat().is_none() {
            return Ok(false);
        }
        self.start_current(&mut inner, "").await?;
        Ok(true)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.ctx.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.ctx.snapshot_rx.clone()
    }

    /// Wire up the inbound half of the transport binding.
    ///
    /// The returned sender may be used from any execution context; the
    /// pump task marshals every command onto the session's own lock.
    pub fn attach_transport(&self) -> mpsc::UnboundedSender<TransportCommand> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    TransportCommand::Play => session.resume().await,
                    TransportCommand::Pause => session.pause().await,
                    TransportCommand::SeekTo(seconds) => session.seek(seconds).await,
                    TransportCommand::Next => {
                        if let Err(e) = session.next_track().await {
                            warn!(error = %e, "transport next failed");
                        }
                    }
                    TransportCommand::Previous => {
                        if let Err(e) = session.previous_track().await {
                            warn!(error = %e, "transport previous failed");
                        }
                    }
                }
            }
        });
        tx
    }

    /// Resolve and start the queue's current song.
    async fn start_current(&self, inner: &mut SessionInner, query: &str) -> Result<()> {
        let song = match inner.queue.current() {
            Some(song) => song.clone(),
            None => return Ok(()),
        };

        self.cancel_tick(inner);
        inner.generation += 1;
        let generation = inner.generation;

        inner.state = PlaybackState::Resolving;
        inner.current_time = 0.0;
        inner.duration = song.duration as f64;
        self.publish(inner);

        // Local-first: a downloaded copy always wins over the stream.
        let source = if self.ctx.store.exists(&song) {
            PlaybackSource::Local(self.ctx.store.resolve_path(&song))
        } else {
            PlaybackSource::Remote(self.ctx.api.stream_url(&song.id, self.ctx.stream_quality))
        };
        debug!(id = %song.id, ?source, "resolved playback source");

        // Fire-and-forget: every start reports the selection, query or not.
        let api = self.ctx.api.clone();
        let query = query.to_string();
        let id = song.id.clone();
        tokio::spawn(async move {
            if let Err(e) = api.update_search_weight(&query, &id).await {
                debug!(error = %e, "search weight update failed");
            }
        });

        if let Err(e) = self.ctx.engine.load(&source).await {
            // Stalled in Resolving; observers see it through the published
            // state rather than a panic or a torn transition.
            warn!(id = %song.id, error = %e, "failed to start playback");
            self.publish(inner);
            return Err(e);
        }

        if let Some(duration) = self.ctx.engine.duration() {
            inner.duration = duration.as_secs_f64();
        }
        inner.state = PlaybackState::Playing;
        self.spawn_tick(inner);
        self.publish(inner);
        self.spawn_artwork_fetch(&song, generation);
        Ok(())
    }

    fn cancel_tick(&self, inner: &mut SessionInner) {
        if let Some(token) = inner.tick_token.take() {
            token.cancel();
        }
    }

    fn spawn_tick(&self, inner: &mut SessionInner) {
        let token = CancellationToken::new();
        inner.tick_token = Some(token.clone());

        let session = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(session.ctx.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => session.handle_tick().await,
                }
            }
        });
    }

    async fn handle_tick(&self) {
        let mut inner = self.ctx.inner.lock().await;
        if inner.state != PlaybackState::Playing {
            // A cancelled timer may still have one tick in flight.
            return;
        }

        if self.ctx.engine.at_end() {
            self.cancel_tick(&mut inner);
            inner.state = PlaybackState::Ended;
            self.publish(&inner);

            // Natural end terminates into a paused, rewound state, never Idle.
            self.ctx.engine.seek(Duration::ZERO);
            self.ctx.engine.stop();
            inner.current_time = 0.0;
            inner.state = PlaybackState::Paused;
            self.publish(&inner);
            return;
        }

        inner.current_time = self.ctx.engine.position().as_secs_f64();
        if let Some(duration) = self.ctx.engine.duration() {
            inner.duration = duration.as_secs_f64();
        }
        if inner.duration > 0.0 {
            inner.current_time = inner.current_time.min(inner.duration);
        }
        self.publish(&inner);
    }

    /// Recompute and publish the snapshot and now-playing record.
    fn publish(&self, inner: &SessionInner) {
        let song = inner.queue.current().cloned();
        let progress = if inner.duration > 0.0 {
            (inner.current_time / inner.duration).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let _ = self.ctx.snapshot_tx.send(PlaybackSnapshot {
            state: inner.state,
            song: song.clone(),
            current_time: inner.current_time,
            duration: inner.duration,
            progress,
        });

        match song {
            Some(song) => self.ctx.sink.publish(&self.now_playing(inner, &song)),
            None => self.ctx.sink.cleared(),
        }
    }

    fn now_playing(&self, inner: &SessionInner, song: &Song) -> NowPlayingInfo {
        NowPlayingInfo {
            title: song.title.clone(),
            artist: song.artist.clone(),
            elapsed: inner.current_time,
            duration: inner.duration,
            playback_rate: if inner.state == PlaybackState::Playing {
                1.0
            } else {
                0.0
            },
            artwork: None,
        }
    }

    /// Best-effort artwork fetch; republishes the now-playing record with
    /// artwork attached unless a newer track superseded this one meanwhile.
    fn spawn_artwork_fetch(&self, song: &Song, generation: u64) {
        if song.thumbnail_url.is_empty() {
            return;
        }

        let session = self.clone();
        let song = song.clone();
        tokio::spawn(async move {
            match session.ctx.api.fetch_bytes(&song.thumbnail_url).await {
                Ok(bytes) => {
                    let inner = session.ctx.inner.lock().await;
                    if inner.generation != generation {
                        debug!(id = %song.id, "discarding stale artwork");
                        return;
                    }
                    let mut info = session.now_playing(&inner, &song);
                    info.artwork = Some(bytes);
                    session.ctx.sink.publish(&info);
                }
                Err(e) => debug!(id = %song.id, error = %e, "artwork fetch failed"),
            }
        });
    }
}
