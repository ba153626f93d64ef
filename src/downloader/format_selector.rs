// FormatSelector - maps user choices to a yt-dlp selection expression
//
// The library interprets the expression; this module only builds it.
// Every video expression carries a fallback chain:
//   exact container within the height ceiling
//   -> any container within the ceiling
//   -> absolute best

use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::FormatEntry;

/// Container / codec the user picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaFormat {
    Mp4,
    WebM,
    Mp3,
    Wav,
}

impl MediaFormat {
    pub const ALL: [MediaFormat; 4] = [Self::Mp4, Self::WebM, Self::Mp3, Self::Wav];

    /// Parse a dropdown label. Decorations around the name are ignored,
    /// so "⚔️ MP4" and "MP4 (Video Scroll)" both resolve.
    pub fn from_label(label: &str) -> Option<Self> {
        label
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|token| match token.to_ascii_lowercase().as_str() {
                "mp4" => Some(Self::Mp4),
                "webm" => Some(Self::WebM),
                "mp3" => Some(Self::Mp3),
                "wav" => Some(Self::Wav),
                _ => None,
            })
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::Mp3 | Self::Wav)
    }

    /// Extension preferred for the video stream / merged file
    pub fn container(&self) -> Option<&'static str> {
        match self {
            Self::Mp4 => Some("mp4"),
            Self::WebM => Some("webm"),
            Self::Mp3 | Self::Wav => None,
        }
    }

    /// Post-processing target for audio-only choices
    pub fn audio_codec(&self) -> Option<AudioCodec> {
        match self {
            Self::Mp3 => Some(AudioCodec::Mp3),
            Self::Wav => Some(AudioCodec::Wav),
            Self::Mp4 | Self::WebM => None,
        }
    }

    /// Audio extension that muxes cleanly into this container
    fn companion_audio_ext(&self) -> &'static str {
        match self {
            Self::WebM => "webm",
            _ => "m4a",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mp4 => write!(f, "MP4"),
            Self::WebM => write!(f, "WebM"),
            Self::Mp3 => write!(f, "MP3"),
            Self::Wav => write!(f, "WAV"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCodec {
    Mp3,
    Wav,
}

impl AudioCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

/// Height ceiling the user picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    P1080,
    P720,
    P480,
    P360,
    /// No ceiling
    Best,
}

impl Quality {
    pub const STANDARD: [Quality; 4] = [Self::P1080, Self::P720, Self::P480, Self::P360];

    /// Parse a dropdown label such as "720p" or "⭐ 720p (Epic)".
    /// Anything unrecognised degrades to `Best`, never an error.
    pub fn from_label(label: &str) -> Self {
        label
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|token| match token.to_ascii_lowercase().as_str() {
                "1080p" | "1080" => Some(Self::P1080),
                "720p" | "720" => Some(Self::P720),
                "480p" | "480" => Some(Self::P480),
                "360p" | "360" => Some(Self::P360),
                _ => None,
            })
            .unwrap_or(Self::Best)
    }

    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::P360 => Some(360),
            Self::Best => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_height() {
            Some(h) => write!(f, "{}p", h),
            None => write!(f, "best"),
        }
    }
}

pub struct FormatSelector;

impl FormatSelector {
    /// Build the selection expression for a format/quality pair.
    pub fn select_format(format: MediaFormat, quality: Quality) -> String {
        let Some(ext) = format.container() else {
            // Audio-only ignores the quality ceiling entirely
            return "bestaudio/best".to_string();
        };
        let audio_ext = format.companion_audio_ext();

        match quality.max_height() {
            Some(h) => format!(
                "bv*[height<={h}][ext={ext}]+ba[ext={audio_ext}]/b[height<={h}][ext={ext}]\
                 /bv*[height<={h}]+ba/b[height<={h}]\
                 /bv*+ba/b"
            ),
            None => format!("bv*[ext={ext}]+ba[ext={audio_ext}]/b[ext={ext}]/bv*+ba/b"),
        }
    }

    /// Same as `select_format`, starting from raw dropdown labels.
    /// An unknown format label falls back to MP4.
    pub fn select_from_labels(format_label: &str, quality_label: &str) -> String {
        let format = MediaFormat::from_label(format_label).unwrap_or(MediaFormat::Mp4);
        Self::select_format(format, Quality::from_label(quality_label))
    }

    /// Quality ceilings a dry extract actually offers, `Best` first.
    pub fn available_qualities(formats: &[FormatEntry]) -> Vec<Quality> {
        let video: Vec<&FormatEntry> = formats.iter().filter(|f| f.has_video()).collect();

        let mut options = vec![Quality::Best];
        for quality in Quality::STANDARD {
            if let Some(target) = quality.max_height() {
                if Self::find_by_height(&video, target).is_some() {
                    options.push(quality);
                }
            }
        }
        options
    }

    /// Recommend a ceiling: 1080p when available, otherwise the highest
    /// standard step the media reaches.
    pub fn recommend_quality(formats: &[FormatEntry]) -> Quality {
        let max_height = formats.iter().filter_map(|f| f.height).max().unwrap_or(0);

        Quality::STANDARD
            .into_iter()
            .find(|q| q.max_height().map_or(false, |h| max_height >= h))
            .unwrap_or(Quality::Best)
    }

    /// Video format near the target height (within 10%)
    fn find_by_height<'a>(formats: &[&'a FormatEntry], target_height: u32) -> Option<&'a FormatEntry> {
        let min_height = target_height * 9 / 10;
        let max_height = target_height * 11 / 10;

        formats
            .iter()
            .filter(|f| f.height.map_or(false, |h| h >= min_height && h <= max_height))
            .max_by_key(|f| f.filesize.unwrap_or(0))
            .copied()
    }
}
