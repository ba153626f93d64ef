// Error types for the download core

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// Empty, placeholder or unrecognised URL. Rejected before a job exists.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A job is already running; only one download at a time.
    #[error("A download is already running")]
    AlreadyRunning,

    /// Raised from the progress hook once the user asked to stop.
    #[error("Download cancelled by user")]
    Cancelled,

    /// Connection-level timeout reported by the library
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// The media exists but cannot be fetched (private, removed, geo-blocked)
    #[error("Media unavailable: {0}")]
    Unavailable(String),

    /// HTTP 429 or bot detection
    #[error("Rate limited by the remote site: {0}")]
    RateLimited(String),

    /// The library has no extractor for this URL
    #[error("Unsupported URL: {0}")]
    UnsupportedSite(String),

    /// yt-dlp executable not found
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Failed to parse library output (JSON, progress)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The library process failed to start or exited abnormally
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unknown(String),
}

impl DownloadError {
    /// Cancellation is a clean stop, never reported as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Text for the user-facing `ERROR:` line.
    ///
    /// Failures classified from library output carry the library's own
    /// wording unchanged; everything else uses the error's display form.
    pub fn detail(&self) -> String {
        match self {
            Self::NetworkTimeout(raw)
            | Self::Unavailable(raw)
            | Self::RateLimited(raw)
            | Self::UnsupportedSite(raw)
            | Self::Unknown(raw) => raw.clone(),
            other => other.to_string(),
        }
    }

    /// Classify diagnostic text coming back from the external library.
    ///
    /// Only the final, exhausted failure reaches this point; the library has
    /// already applied its own retries.
    pub fn from_library_output(text: &str) -> Self {
        let message = error_detail(text);
        let lower = text.to_lowercase();

        if lower.contains("cancelled by user") {
            return Self::Cancelled;
        }

        if lower.contains("timed out") || lower.contains("timeout") {
            return Self::NetworkTimeout(message);
        }

        if lower.contains("http error 429")
            || lower.contains("too many requests")
            || lower.contains("confirm you're not a bot")
            || lower.contains("confirm you’re not a bot")
        {
            return Self::RateLimited(message);
        }

        if lower.contains("unsupported url") {
            return Self::UnsupportedSite(message);
        }

        if lower.contains("video unavailable")
            || lower.contains("private video")
            || lower.contains("has been removed")
            || lower.contains("not available in your country")
            || lower.contains("no video could be found")
            || lower.contains("http error 404")
        {
            return Self::Unavailable(message);
        }

        if lower.contains("command not found")
            || lower.contains("no such file or directory")
        {
            return Self::ToolNotFound(message);
        }

        if lower.contains("json") && (lower.contains("parse") || lower.contains("decode")) {
            return Self::ParseError(message);
        }

        Self::Unknown(message)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for DownloadError {
    fn from(e: serde_json::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

/// The `ERROR:` lines of a tool output, prefixes removed, joined in order.
/// Falls back to the last non-empty line when there is none. The runner
/// re-adds a single prefix when logging.
fn error_detail(text: &str) -> String {
    let errors: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter_map(|l| l.strip_prefix("ERROR:"))
        .map(str::trim)
        .collect();
    if !errors.is_empty() {
        return errors.join("; ");
    }

    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown error")
        .to_string()
}
