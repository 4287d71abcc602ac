// Application configuration and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::model::Quality;

/// Remote API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.driftplay.app".to_string(),
        }
    }
}

/// Local storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding downloaded audio and the local index.
    pub music_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            music_dir: PathBuf::from("music"),
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Interval between session ticks while playing, in milliseconds.
    pub tick_interval_ms: u64,
    /// Quality tier requested for remote streams.
    pub stream_quality: Quality,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            stream_quality: Quality::Lossless,
        }
    }
}

/// Download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Quality tier requested when none is given explicitly.
    pub default_quality: Quality,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_quality: Quality::Lossless,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub version: i32, // Config schema version for future migrations
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub playback: PlaybackConfig,
    pub downloads: DownloadConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            playback: PlaybackConfig::default(),
            downloads: DownloadConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the config file path inside the application directory
    pub fn config_path(app_dir: &Path) -> PathBuf {
        app_dir.join("config.json")
    }

    /// Load configuration from file, or return defaults if no file exists
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::config_path(app_dir);

        if !path.exists() {
            info!("no config file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| EngineError::MalformedResponse(format!("config: {}", e)))?;

        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, app_dir: &Path) -> Result<()> {
        fs::create_dir_all(app_dir)?;

        let path = Self::config_path(app_dir);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::MalformedResponse(format!("config: {}", e)))?;
        fs::write(&path, content)?;

        info!(path = %path.display(), "saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.api.base_url = "http://localhost:9999".to_string();
        config.playback.tick_interval_ms = 100;
        config.save(dir.path()).unwrap();

        let loaded = AppConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.api.base_url, "http://localhost:9999");
        assert_eq!(loaded.playback.tick_interval_ms, 100);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path()).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.playback.stream_quality, Quality::Lossless);
    }
}
