// Common data models for the download core

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::errors::DownloadError;
use super::format_selector::{AudioCodec, FormatSelector, MediaFormat, Quality};
use super::platform::{self, Platform};

/// A validated download request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    url: String,
    destination: PathBuf,
    format_expression: String,
    platform: Platform,
    format: MediaFormat,
}

impl DownloadRequest {
    /// Build a request from UI input. Unsupported URLs are rejected here,
    /// before any job exists.
    pub fn new(
        url: &str,
        destination: impl Into<PathBuf>,
        format: MediaFormat,
        quality: Quality,
    ) -> Result<Self, DownloadError> {
        let url = url.trim();
        let platform = platform::detect(url);
        if !platform.is_supported() {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            url: url.to_string(),
            destination: destination.into(),
            format_expression: FormatSelector::select_format(format, quality),
            platform,
            format,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn format_expression(&self) -> &str {
        &self.format_expression
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    /// Codec to convert into after download, for audio-only choices
    pub fn audio_codec(&self) -> Option<AudioCodec> {
        self.format.audio_codec()
    }
}

/// Visible lifecycle of a download attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Running,
    Cancelling,
    Finished,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Cancelling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }
}

/// How a job ended. Carried by the terminal `Done` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum JobOutcome {
    Finished,
    Failed(String),
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            Self::Finished => JobState::Finished,
            Self::Failed(_) => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A user-facing log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == LogLevel::Error
    }
}

/// Event published by the background unit, consumed once by the UI context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Percentage in [0, 100]
    Progress(f32),
    LogLine(LogLine),
    Done(JobOutcome),
}

/// Everything the external library is configured with for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryOptions {
    pub output_dir: PathBuf,
    pub output_template: String,
    pub format_expression: String,
    pub socket_timeout_secs: u32,
    pub retries: u32,
    pub extractor_args: Option<String>,
    pub audio_codec: Option<AudioCodec>,
    pub merge_output_format: Option<String>,
    pub proxy: Option<String>,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            output_template: "%(uploader)s - %(title)s.%(ext)s".to_string(),
            format_expression: "best".to_string(),
            socket_timeout_secs: 30,
            retries: 3,
            extractor_args: None,
            audio_codec: None,
            merge_output_format: None,
            proxy: None,
        }
    }
}

/// Status of a single progress callback from the library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Downloading,
    Finished,
    Error,
}

/// Raw counters handed to the progress hook. Any of them may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferUpdate {
    pub status: TransferStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    pub percent_str: Option<String>,
}

impl TransferUpdate {
    pub fn downloading(downloaded: u64, total: Option<u64>) -> Self {
        Self {
            status: TransferStatus::Downloading,
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            total_bytes_estimate: None,
            percent_str: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            status: TransferStatus::Finished,
            downloaded_bytes: None,
            total_bytes: None,
            total_bytes_estimate: None,
            percent_str: None,
        }
    }
}

/// Metadata from a dry extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_secs: u64,
    pub thumbnail: String,
    pub formats: Vec<FormatEntry>,
}

impl VideoInfo {
    /// `m:ss` or `h:mm:ss`
    pub fn duration_label(&self) -> String {
        let hours = self.duration_secs / 3600;
        let minutes = (self.duration_secs % 3600) / 60;
        let seconds = self.duration_secs % 60;
        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatEntry {
    pub format_id: String,
    pub ext: String,
    pub height: Option<u32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
}

impl FormatEntry {
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().map_or(false, |v| v != "none" && !v.is_empty())
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().map_or(false, |a| a != "none" && !a.is_empty())
    }
}
