// Application settings, passed explicitly into the download core

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{DownloadRequest, LibraryOptions};
use crate::downloader::platform::Platform;

/// Environment override for the yt-dlp executable
pub const YTDLP_ENV: &str = "MEDIASLAYER_YTDLP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default destination shown in the UI
    pub download_dir: PathBuf,
    pub output_template: String,
    /// Forwarded to the library's connection layer
    pub socket_timeout_secs: u32,
    /// Forwarded to the library's retry loop
    pub retries: u32,
    /// Optional wall-clock limit per job
    pub watchdog_secs: Option<u64>,
    /// How long a finished/failed/cancelled job stays visible
    pub display_delay_ms: u64,
    pub ytdlp_path: Option<PathBuf>,
    pub proxy: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            output_template: "%(uploader)s - %(title)s.%(ext)s".to_string(),
            socket_timeout_secs: 30,
            retries: 3,
            watchdog_secs: None,
            display_delay_ms: 3000,
            ytdlp_path: None,
            proxy: None,
        }
    }
}

impl Settings {
    /// `<config dir>/mediaslayer/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mediaslayer").join("settings.json"))
    }

    /// Load settings; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, DownloadError> {
        if !path.exists() {
            tracing::debug!("[config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DownloadError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let settings: Self = serde_json::from_str(&content)
            .map_err(|e| DownloadError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        tracing::info!("[config] Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), DownloadError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| DownloadError::Config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn display_delay(&self) -> Duration {
        Duration::from_millis(self.display_delay_ms)
    }

    pub fn watchdog(&self) -> Option<Duration> {
        self.watchdog_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    /// Explicit path, then the environment override, then discovery.
    pub fn ytdlp_override(&self) -> Option<PathBuf> {
        self.ytdlp_path
            .clone()
            .or_else(|| std::env::var_os(YTDLP_ENV).map(PathBuf::from))
    }

    /// Library configuration for one request
    pub fn library_options(&self, request: &DownloadRequest) -> LibraryOptions {
        LibraryOptions {
            output_dir: request.destination().to_path_buf(),
            output_template: self.output_template.clone(),
            format_expression: request.format_expression().to_string(),
            socket_timeout_secs: self.socket_timeout_secs,
            retries: self.retries,
            extractor_args: request.platform().extractor_args().map(str::to_string),
            audio_codec: request.audio_codec(),
            merge_output_format: request.format().container().map(str::to_string),
            proxy: self.proxy.clone(),
        }
    }

    /// Library configuration for a metadata-only extract
    pub fn metadata_options(&self, platform: Platform) -> LibraryOptions {
        LibraryOptions {
            output_dir: self.download_dir.clone(),
            output_template: self.output_template.clone(),
            socket_timeout_secs: self.socket_timeout_secs,
            retries: self.retries,
            extractor_args: platform.extractor_args().map(str::to_string),
            proxy: self.proxy.clone(),
            ..LibraryOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::format_selector::{AudioCodec, MediaFormat, Quality};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.socket_timeout_secs, 30);
        assert_eq!(settings.retries, 3);
        assert_eq!(settings.display_delay(), Duration::from_secs(3));
        assert_eq!(settings.watchdog(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings {
            download_dir: dir.path().to_path_buf(),
            retries: 7,
            watchdog_secs: Some(300),
            proxy: Some("socks5h://127.0.0.1:1080".to_string()),
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.watchdog(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "retries": 1 }"#).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.retries, 1);
        assert_eq!(loaded.socket_timeout_secs, 30);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Settings::load(&path), Err(DownloadError::Config(_))));
    }

    #[test]
    fn test_library_options_for_twitter_audio() {
        let request = DownloadRequest::new(
            "https://x.com/user/status/1",
            "/tmp/media",
            MediaFormat::Wav,
            Quality::P720,
        )
        .unwrap();
        let options = Settings::default().library_options(&request);

        assert_eq!(options.output_dir, PathBuf::from("/tmp/media"));
        assert_eq!(options.format_expression, "bestaudio/best");
        assert_eq!(options.audio_codec, Some(AudioCodec::Wav));
        assert_eq!(options.merge_output_format, None);
        assert_eq!(
            options.extractor_args.as_deref(),
            Some("twitter:api=syndication,legacy,graphql")
        );
        assert_eq!(options.socket_timeout_secs, 30);
        assert_eq!(options.retries, 3);
    }
}
