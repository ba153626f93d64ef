// Visible lifecycle of a download attempt, driven from the UI context
//
// Idle -> Running -> {Finished, Failed, Cancelled} -> Idle
//
// The controller is the only owner of job state. It changes state on user
// actions and on events drained from the channel in `pump`, never from the
// background unit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use super::backends::YtDlpBackend;
use super::errors::DownloadError;
use super::events::{self, EventReceiver};
use super::format_selector::{MediaFormat, Quality};
use super::models::{DownloadRequest, JobOutcome, JobState, LogLine, ProgressEvent};
use super::runner::DownloadRunner;
use super::traits::MediaBackend;
use crate::config::Settings;

pub struct DownloadController {
    runner: DownloadRunner,
    events: EventReceiver,
    state: JobState,
    progress: f32,
    cancel_requested: bool,
    outcome: Option<JobOutcome>,
    log: Vec<LogLine>,
    terminal_since: Option<Instant>,
    display_delay: Duration,
}

impl DownloadController {
    pub fn new(backend: Arc<dyn MediaBackend>, settings: Settings, handle: Handle) -> Self {
        let display_delay = settings.display_delay();
        let (tx, rx) = events::channel();
        Self {
            runner: DownloadRunner::new(backend, settings, tx, handle),
            events: rx,
            state: JobState::Idle,
            progress: 0.0,
            cancel_requested: false,
            outcome: None,
            log: Vec::new(),
            terminal_since: None,
            display_delay,
        }
    }

    /// Controller backed by the `yt-dlp` executable
    pub fn with_ytdlp(settings: Settings, handle: Handle) -> Self {
        let backend = YtDlpBackend::new(settings.ytdlp_override());
        Self::new(Arc::new(backend), settings, handle)
    }

    /// Validate the input and start a job.
    ///
    /// Rejected without any state change while a job is active or when the
    /// URL is not recognised. Allowed from a terminal state that is still
    /// on display.
    pub fn submit(
        &mut self,
        url: &str,
        format: MediaFormat,
        quality: Quality,
        destination: impl Into<PathBuf>,
    ) -> Result<(), DownloadError> {
        if self.state.is_active() {
            return Err(DownloadError::AlreadyRunning);
        }

        let request = DownloadRequest::new(url, destination, format, quality)?;
        self.runner.start(&request)?;

        self.state = JobState::Running;
        self.progress = 0.0;
        self.cancel_requested = false;
        self.outcome = None;
        self.terminal_since = None;
        tracing::debug!("[controller] Running: {}", request.url());
        Ok(())
    }

    /// Same as `submit`, from dropdown labels. Unknown format labels fall
    /// back to MP4 and unknown quality labels to best.
    pub fn submit_labels(
        &mut self,
        url: &str,
        format_label: &str,
        quality_label: &str,
        destination: impl Into<PathBuf>,
    ) -> Result<(), DownloadError> {
        let format = MediaFormat::from_label(format_label).unwrap_or(MediaFormat::Mp4);
        self.submit(url, format, Quality::from_label(quality_label), destination)
    }

    /// Request cooperative cancellation. No-op unless a job is running.
    pub fn cancel(&mut self) -> bool {
        if self.state != JobState::Running || self.cancel_requested {
            return false;
        }
        if !self.runner.cancel() {
            return false;
        }
        self.cancel_requested = true;
        self.state = JobState::Cancelling;
        true
    }

    /// Drain the channel and apply every event, then reset to Idle once a
    /// terminal state has been on display for the configured delay.
    ///
    /// Call once per iteration of the UI loop. Returns the applied events.
    pub fn pump(&mut self, now: Instant) -> Vec<ProgressEvent> {
        let drained = self.events.drain();
        for event in &drained {
            self.apply(event, now);
        }

        if let Some(since) = self.terminal_since.filter(|_| self.state.is_terminal()) {
            if now.saturating_duration_since(since) >= self.display_delay {
                self.reset();
            }
        }
        drained
    }

    fn apply(&mut self, event: &ProgressEvent, now: Instant) {
        match event {
            ProgressEvent::Progress(percent) => {
                if self.state.is_active() {
                    self.progress = self.progress.max(percent.clamp(0.0, 100.0));
                }
            }
            ProgressEvent::LogLine(line) => self.log.push(line.clone()),
            ProgressEvent::Done(outcome) => {
                self.state = outcome.state();
                if self.state == JobState::Finished {
                    self.progress = 100.0;
                }
                self.outcome = Some(outcome.clone());
                self.terminal_since = Some(now);
                tracing::info!("[controller] {:?}", self.state);
            }
        }
    }

    fn reset(&mut self) {
        tracing::debug!("[controller] Back to idle");
        self.state = JobState::Idle;
        self.progress = 0.0;
        self.cancel_requested = false;
        self.terminal_since = None;
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Outcome of the most recent job; kept after the reset to Idle
    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.outcome.as_ref()
    }

    pub fn log_lines(&self) -> &[LogLine] {
        &self.log
    }

    pub fn runner(&self) -> &DownloadRunner {
        &self.runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::TransferUpdate;
    use crate::downloader::testing::{Script, ScriptedBackend};

    fn controller(backend: ScriptedBackend, delay_ms: u64) -> DownloadController {
        let settings = Settings {
            display_delay_ms: delay_ms,
            ..Settings::default()
        };
        DownloadController::new(Arc::new(backend), settings, Handle::current())
    }

    /// Pump until the job leaves the active states
    async fn pump_until_terminal(ctrl: &mut DownloadController) -> Vec<ProgressEvent> {
        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while ctrl.state().is_active() {
            assert!(Instant::now() < deadline, "job never finished");
            tokio::time::sleep(Duration::from_millis(2)).await;
            seen.extend(ctrl.pump(Instant::now()));
        }
        seen
    }

    fn progress_values(events: &[ProgressEvent]) -> Vec<f32> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_youtube_720p_mp4_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(ScriptedBackend::succeeding(), 3000);
        assert_eq!(ctrl.state(), JobState::Idle);

        ctrl.submit("https://youtube.com/watch?v=abc", MediaFormat::Mp4, Quality::P720, dir.path())
            .unwrap();
        assert_eq!(ctrl.state(), JobState::Running);
        assert_eq!(ctrl.progress(), 0.0);

        let seen = pump_until_terminal(&mut ctrl).await;
        assert_eq!(ctrl.state(), JobState::Finished);
        assert_eq!(ctrl.outcome(), Some(&JobOutcome::Finished));
        assert_eq!(ctrl.progress(), 100.0);

        let values = progress_values(&seen);
        assert_eq!(values.last(), Some(&100.0));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values.iter().all(|p| (0.0..=100.0).contains(p)));
        assert!(ctrl.log_lines().iter().all(|l| !l.is_error()));
    }

    #[tokio::test]
    async fn test_cancel_right_after_submit() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(ScriptedBackend::succeeding(), 3000);

        ctrl.submit("https://youtube.com/watch?v=abc", MediaFormat::Mp4, Quality::P720, dir.path())
            .unwrap();
        assert!(ctrl.cancel());
        assert_eq!(ctrl.state(), JobState::Cancelling);
        assert!(ctrl.cancel_requested());
        assert!(!ctrl.cancel());

        pump_until_terminal(&mut ctrl).await;
        assert_eq!(ctrl.state(), JobState::Cancelled);
        assert_eq!(ctrl.outcome(), Some(&JobOutcome::Cancelled));
        assert!(ctrl.log_lines().iter().all(|l| !l.is_error()));
        assert!(ctrl
            .log_lines()
            .contains(&LogLine::info("Cancellation requested by user.")));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_without_job() {
        let backend = ScriptedBackend::succeeding();
        let mut ctrl = controller(backend, 3000);

        for url in ["not a url", "", "   ", "https://vimeo.com/123"] {
            let err = ctrl.submit(url, MediaFormat::Mp4, Quality::P720, ".").unwrap_err();
            assert!(matches!(err, DownloadError::InvalidUrl(_)));
        }
        assert_eq!(ctrl.state(), JobState::Idle);
        assert!(!ctrl.runner().is_running());
        assert!(ctrl.pump(Instant::now()).is_empty());
        assert!(ctrl.log_lines().is_empty());
    }

    #[tokio::test]
    async fn test_second_submit_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(ScriptedBackend::new(Script::BlockUntilCancelled), 3000);

        ctrl.submit("https://youtube.com/watch?v=abc", MediaFormat::Mp4, Quality::P720, dir.path())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctrl.pump(Instant::now());
        let progress_before = ctrl.progress();

        let err = ctrl
            .submit("https://x.com/user/status/1", MediaFormat::Mp3, Quality::Best, dir.path())
            .unwrap_err();
        assert_eq!(err, DownloadError::AlreadyRunning);
        assert_eq!(ctrl.state(), JobState::Running);
        assert_eq!(ctrl.progress(), progress_before);
        assert!(!ctrl.cancel_requested());

        ctrl.cancel();
        pump_until_terminal(&mut ctrl).await;
        assert_eq!(ctrl.state(), JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_before_start_is_noop() {
        let mut ctrl = controller(ScriptedBackend::succeeding(), 3000);

        assert!(!ctrl.cancel());
        assert_eq!(ctrl.state(), JobState::Idle);
        assert!(!ctrl.cancel_requested());
        assert!(ctrl.pump(Instant::now()).is_empty());
    }

    #[tokio::test]
    async fn test_failure_and_panic_reach_failed() {
        let dir = tempfile::tempdir().unwrap();
        let failing = ScriptedBackend::new(Script::Fail(
            vec![TransferUpdate::downloading(5, Some(10))],
            "ERROR: Unable to download webpage: The read operation timed out".to_string(),
        ));

        for backend in [failing, ScriptedBackend::new(Script::Panic)] {
            let mut ctrl = controller(backend, 3000);
            ctrl.submit("https://youtu.be/abc", MediaFormat::WebM, Quality::P480, dir.path())
                .unwrap();

            let seen = pump_until_terminal(&mut ctrl).await;
            assert_eq!(ctrl.state(), JobState::Failed);
            let dones = seen.iter().filter(|e| matches!(e, ProgressEvent::Done(_))).count();
            assert_eq!(dones, 1);
            let errors: Vec<&LogLine> = ctrl.log_lines().iter().filter(|l| l.is_error()).collect();
            assert_eq!(errors.len(), 1);
            assert!(errors[0].message.starts_with("ERROR: "));
        }
    }

    #[tokio::test]
    async fn test_reset_after_display_delay() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(ScriptedBackend::succeeding(), 3000);

        ctrl.submit("https://youtube.com/watch?v=abc", MediaFormat::Mp4, Quality::P720, dir.path())
            .unwrap();
        pump_until_terminal(&mut ctrl).await;
        assert_eq!(ctrl.state(), JobState::Finished);

        let shown_at = Instant::now();
        ctrl.pump(shown_at + Duration::from_millis(2900));
        assert_eq!(ctrl.state(), JobState::Finished);
        assert_eq!(ctrl.progress(), 100.0);

        ctrl.pump(shown_at + Duration::from_secs(4));
        assert_eq!(ctrl.state(), JobState::Idle);
        assert_eq!(ctrl.progress(), 0.0);
        assert!(!ctrl.cancel_requested());
        assert_eq!(ctrl.outcome(), Some(&JobOutcome::Finished));
    }

    #[tokio::test]
    async fn test_new_job_from_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::succeeding());
        let settings = Settings::default();
        let mut ctrl = DownloadController::new(backend.clone(), settings, Handle::current());

        ctrl.submit_labels("https://youtube.com/watch?v=abc", "⚔️ MP4", "⭐ 720p (Epic)", dir.path())
            .unwrap();
        pump_until_terminal(&mut ctrl).await;
        assert_eq!(ctrl.state(), JobState::Finished);

        ctrl.submit_labels("https://x.com/user/status/1", "🎵 MP3", "whatever", dir.path())
            .unwrap();
        assert_eq!(ctrl.state(), JobState::Running);
        assert_eq!(ctrl.progress(), 0.0);
        pump_until_terminal(&mut ctrl).await;
        assert_eq!(ctrl.state(), JobState::Finished);

        assert_eq!(backend.calls(), 2);
        let options = backend.last_options().unwrap();
        assert_eq!(options.format_expression, "bestaudio/best");
        assert!(options.extractor_args.is_some());
    }
}
