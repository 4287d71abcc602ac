// Audio engine seam and rodio-backed implementation
use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::model::PlaybackSource;

/// The single active playback engine owned by the session manager.
///
/// Implementations must be internally synchronized; the session calls in
/// from its own single-writer path only.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Replace the current media with the source and start playing from the
    /// beginning. On error the previous media is gone but no new one plays.
    async fn load(&self, source: &PlaybackSource) -> Result<()>;

    fn resume(&self);
    fn pause(&self);
    fn stop(&self);
    fn seek(&self, position: Duration);

    /// Current playback position within the loaded media.
    fn position(&self) -> Duration;

    /// Media duration, if the engine could determine it.
    fn duration(&self) -> Option<Duration>;

    /// Whether the loaded media played through to its natural end.
    fn at_end(&self) -> bool;
}

/// rodio-backed engine.
///
/// Local sources decode straight from disk; remote sources are fetched
/// fully into memory and decoded from a cursor, so the sink never blocks
/// on the network mid-track.
pub struct RodioEngine {
    handle: OutputStreamHandle,
    http: reqwest::Client,
    sink: Mutex<Option<Sink>>,
    duration: Mutex<Option<Duration>>,
}

impl RodioEngine {
    pub fn new() -> Result<Self> {
        // The cpal stream behind OutputStream is not Send, so it lives on
        // a dedicated thread for the lifetime of the engine; only the
        // handle crosses threads.
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || match OutputStream::try_default() {
            Ok((stream, handle)) => {
                let _ = tx.send(Ok(handle));
                // Keep the stream alive for the life of the process.
                let _stream = stream;
                loop {
                    std::thread::park();
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
            }
        });

        let handle = rx
            .recv()
            .map_err(|_| EngineError::Playback("audio output thread died".to_string()))?
            .map_err(EngineError::Playback)?;

        Ok(Self {
            handle,
            http: reqwest::Client::new(),
            sink: Mutex::new(None),
            duration: Mutex::new(None),
        })
    }

    fn start_sink<S>(&self, source: S) -> Result<()>
    where
        S: Source + Send + 'static,
        S::Item: rodio::Sample + Send,
        f32: rodio::cpal::FromSample<S::Item>,
    {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| EngineError::Playback(format!("failed to create sink: {e}")))?;
        *self.duration.lock().unwrap() = source.total_duration();
        sink.append(source);
        sink.play();
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }
}

#[async_trait]
impl PlaybackEngine for RodioEngine {
    async fn load(&self, source: &PlaybackSource) -> Result<()> {
        self.stop();

        match source {
            PlaybackSource::Local(path) => {
                let file = File::open(path)?;
                let decoder = Decoder::new(BufReader::new(file)).map_err(|e| {
                    EngineError::Resolution(format!("undecodable media {}: {e}", path.display()))
                })?;
                self.start_sink(decoder)
            }
            PlaybackSource::Remote(url) => {
                let bytes = self
                    .http
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?;
                let decoder = Decoder::new(Cursor::new(bytes.to_vec())).map_err(|e| {
                    EngineError::Resolution(format!("undecodable stream {url}: {e}"))
                })?;
                self.start_sink(decoder)
            }
        }
    }

    fn resume(&self) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.play();
        }
    }

    fn pause(&self) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.pause();
        }
    }

    fn stop(&self) {
        if let Some(sink) = self.sink.lock().unwrap().take() {
            sink.stop();
        }
        *self.duration.lock().unwrap() = None;
    }

    fn seek(&self, position: Duration) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            if let Err(e) = sink.try_seek(position) {
                warn!(error = %e, "seek not supported for current media");
            }
        }
    }

    fn position(&self) -> Duration {
        self.sink
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.get_pos())
            .unwrap_or(Duration::ZERO)
    }

    fn duration(&self) -> Option<Duration> {
        *self.duration.lock().unwrap()
    }

    fn at_end(&self) -> bool {
        self.sink
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.empty())
            .unwrap_or(false)
    }
}
