// Windows System Media Transport Controls binding
//
// Implements the outbound NowPlayingSink against SMTC and forwards the
// hardware/media-key buttons back as TransportCommands.
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use windows::Foundation::TypedEventHandler;
use windows::Media::Playback::MediaPlayer;
use windows::Media::{
    MediaPlaybackStatus, MediaPlaybackType, SystemMediaTransportControls,
    SystemMediaTransportControlsButton, SystemMediaTransportControlsButtonPressedEventArgs,
};
use windows::Storage::StorageFile;
use windows::Storage::Streams::RandomAccessStreamReference;

use crate::transport::{NowPlayingInfo, NowPlayingSink, TransportCommand};

pub struct SmtcBinding {
    // The MediaPlayer instance must stay alive for the SMTC to work.
    _media_player: MediaPlayer,
    smtc: SystemMediaTransportControls,
    artwork_file: std::sync::Mutex<Option<PathBuf>>,
}

impl SmtcBinding {
    /// Register with SMTC; button presses are forwarded to `commands`.
    pub fn new(commands: mpsc::UnboundedSender<TransportCommand>) -> Result<Self, String> {
        let media_player =
            MediaPlayer::new().map_err(|e| format!("failed to create MediaPlayer: {e}"))?;

        // Manual control of the SMTC instead of the command manager.
        media_player
            .CommandManager()
            .and_then(|m| m.SetIsEnabled(false))
            .map_err(|e| format!("failed to disable CommandManager: {e}"))?;

        let smtc = media_player
            .SystemMediaTransportControls()
            .map_err(|e| format!("failed to get SMTC: {e}"))?;

        smtc.SetIsEnabled(true)
            .and_then(|_| smtc.SetIsPlayEnabled(true))
            .and_then(|_| smtc.SetIsPauseEnabled(true))
            .and_then(|_| smtc.SetIsNextEnabled(true))
            .and_then(|_| smtc.SetIsPreviousEnabled(true))
            .map_err(|e| format!("failed to enable SMTC buttons: {e}"))?;

        let handler = TypedEventHandler::new(
            move |_sender: &Option<SystemMediaTransportControls>,
                  args: &Option<SystemMediaTransportControlsButtonPressedEventArgs>| {
                if let Some(args) = args {
                    if let Ok(button) = args.Button() {
                        let command = match button {
                            SystemMediaTransportControlsButton::Play => {
                                Some(TransportCommand::Play)
                            }
                            SystemMediaTransportControlsButton::Pause => {
                                Some(TransportCommand::Pause)
                            }
                            SystemMediaTransportControlsButton::Next => {
                                Some(TransportCommand::Next)
                            }
                            SystemMediaTransportControlsButton::Previous => {
                                Some(TransportCommand::Previous)
                            }
                            _ => None,
                        };
                        if let Some(command) = command {
                            let _ = commands.send(command);
                        }
                    }
                }
                Ok(())
            },
        );
        smtc.ButtonPressed(&handler)
            .map_err(|e| format!("failed to register button handler: {e}"))?;

        Ok(Self {
            _media_player: media_player,
            smtc,
            artwork_file: std::sync::Mutex::new(None),
        })
    }

    fn update(&self, info: &NowPlayingInfo) -> Result<(), String> {
        let updater = self
            .smtc
            .DisplayUpdater()
            .map_err(|e| format!("failed to get display updater: {e}"))?;

        updater
            .SetType(MediaPlaybackType::Music)
            .map_err(|e| format!("failed to set type: {e}"))?;

        let music = updater
            .MusicProperties()
            .map_err(|e| format!("failed to get music properties: {e}"))?;
        music
            .SetTitle(&windows::core::HSTRING::from(info.title.as_str()))
            .map_err(|e| format!("failed to set title: {e}"))?;
        music
            .SetArtist(&windows::core::HSTRING::from(info.artist.as_str()))
            .map_err(|e| format!("failed to set artist: {e}"))?;

        if let Some(bytes) = &info.artwork {
            match self.artwork_to_file(bytes) {
                Ok(path) => self.set_thumbnail(&updater, &path),
                Err(e) => warn!(error = %e, "failed to stage artwork"),
            }
        }

        updater
            .Update()
            .map_err(|e| format!("failed to update display: {e}"))?;

        let status = if info.playback_rate > 0.0 {
            MediaPlaybackStatus::Playing
        } else {
            MediaPlaybackStatus::Paused
        };
        self.smtc
            .SetPlaybackStatus(status)
            .map_err(|e| format!("failed to set playback status: {e}"))?;

        Ok(())
    }

    /// SMTC wants a file; stage the artwork bytes in the temp directory.
    fn artwork_to_file(&self, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = std::env::temp_dir().join("driftplay-artwork.img");
        let mut file = std::fs::File::create(&path)?;
        file.write_all(bytes)?;
        *self.artwork_file.lock().unwrap() = Some(path.clone());
        Ok(path)
    }

    fn set_thumbnail(
        &self,
        updater: &windows::Media::SystemMediaTransportControlsDisplayUpdater,
        path: &std::path::Path,
    ) {
        let path_str = path.to_string_lossy().to_string();
        let file = StorageFile::GetFileFromPathAsync(&windows::core::HSTRING::from(&path_str))
            .and_then(|op| op.get());
        match file {
            Ok(file) => match RandomAccessStreamReference::CreateFromFile(&file) {
                Ok(stream) => {
                    if let Err(e) = updater.SetThumbnail(&stream) {
                        warn!(error = %e, "failed to set SMTC thumbnail");
                    }
                }
                Err(e) => warn!(error = %e, "failed to create artwork stream"),
            },
            Err(e) => warn!(error = %e, "failed to open staged artwork"),
        }
    }
}

impl NowPlayingSink for SmtcBinding {
    fn publish(&self, info: &NowPlayingInfo) {
        if let Err(e) = self.update(info) {
            warn!(error = %e, "SMTC update failed");
        }
    }

    fn cleared(&self) {
        if let Err(e) = self.smtc.SetPlaybackStatus(MediaPlaybackStatus::Stopped) {
            debug!(error = %e, "SMTC clear failed");
        }
    }
}

// The WinRT proxies are apartment-bound but all calls go through the
// session's single-writer path.
unsafe impl Send for SmtcBinding {}
unsafe impl Sync for SmtcBinding {}
