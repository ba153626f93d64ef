// Callbacks handed to the download library for one job
//
// Both run on the library's own execution context and only ever publish
// onto the event channel.

use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::DownloadError;
use super::events::EventSender;
use super::models::{LogLevel, TransferStatus, TransferUpdate};

lazy_static::lazy_static! {
    // Colour codes, in case the library ignores --no-colors
    static ref ANSI_RE: Regex = Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap();
}

/// Cooperative cancellation flag. Goes false -> true at most once.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns true only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Percentage for a progress callback, if one can be derived.
///
/// Exact byte ratio first, then the library's own percent string.
/// Never returns a value outside [0, 100].
pub fn compute_percent(update: &TransferUpdate) -> Option<f32> {
    match update.status {
        TransferStatus::Finished => Some(100.0),
        TransferStatus::Error => None,
        TransferStatus::Downloading => {
            let total = update
                .total_bytes
                .or(update.total_bytes_estimate)
                .filter(|t| *t > 0);

            let percent = match (update.downloaded_bytes, total) {
                (Some(done), Some(total)) => Some(done as f64 / total as f64 * 100.0),
                _ => update.percent_str.as_deref().and_then(parse_percent_str),
            }?;

            if percent.is_finite() {
                Some(percent.clamp(0.0, 100.0) as f32)
            } else {
                None
            }
        }
    }
}

/// Parse strings like " 42.1%" (ANSI colour codes tolerated)
fn parse_percent_str(raw: &str) -> Option<f64> {
    let cleaned: String = ANSI_RE
        .replace_all(raw, "")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Progress hook for one job. Emits non-decreasing percentages and raises
/// `Cancelled` back into the library once the token is set.
#[derive(Debug)]
pub struct ProgressHook {
    cancel: CancelToken,
    events: EventSender,
    last_percent: f32,
}

impl ProgressHook {
    pub fn new(cancel: CancelToken, events: EventSender) -> Self {
        Self {
            cancel,
            events,
            last_percent: 0.0,
        }
    }

    pub fn on_update(&mut self, update: &TransferUpdate) -> Result<(), DownloadError> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let Some(percent) = compute_percent(update) else {
            return Ok(());
        };

        if update.status == TransferStatus::Finished {
            self.last_percent = 100.0;
            self.events.progress(100.0);
        } else if percent > self.last_percent {
            // A second stream (audio after video) restarts at 0; hold the bar
            self.last_percent = percent;
            self.events.progress(percent);
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Routes library diagnostics onto the event channel.
#[derive(Debug, Clone)]
pub struct LogShim {
    events: EventSender,
}

impl LogShim {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    /// Debug output is noisy; only extractor / download milestones pass.
    pub fn debug(&self, msg: &str) {
        tracing::trace!("[library] {}", msg);
        if msg.starts_with("[youtube]") || msg.contains("Extracting") || msg.contains("Downloading") {
            self.events.log(LogLevel::Debug, msg);
        }
    }

    pub fn info(&self, msg: &str) {
        tracing::debug!("[library] {}", msg);
        self.events.log(LogLevel::Info, msg);
    }

    pub fn warning(&self, msg: &str) {
        tracing::warn!("[library] {}", msg);
        let msg = strip_level_prefix(msg, "WARNING:");
        self.events.log(LogLevel::Warning, format!("WARNING: {}", msg));
    }

    pub fn error(&self, msg: &str) {
        tracing::error!("[library] {}", msg);
        let msg = strip_level_prefix(msg, "ERROR:");
        self.events.log(LogLevel::Error, format!("ERROR: {}", msg));
    }
}

fn strip_level_prefix<'a>(msg: &'a str, prefix: &str) -> &'a str {
    msg.trim().strip_prefix(prefix).map(str::trim_start).unwrap_or(msg.trim())
}

/// Everything the library receives for one job
#[derive(Debug)]
pub struct JobHooks {
    pub progress: ProgressHook,
    pub logger: LogShim,
}

impl JobHooks {
    pub fn new(cancel: CancelToken, events: EventSender) -> Self {
        Self {
            progress: ProgressHook::new(cancel, events.clone()),
            logger: LogShim::new(events),
        }
    }
}
