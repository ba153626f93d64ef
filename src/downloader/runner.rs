// Owns the single background download unit

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinError;

use super::errors::DownloadError;
use super::events::EventSender;
use super::hooks::{CancelToken, JobHooks};
use super::models::{DownloadRequest, JobOutcome, LibraryOptions, LogLevel, VideoInfo};
use super::platform;
use super::traits::MediaBackend;
use crate::config::Settings;

/// Cancellation token of the job in flight, if any
type ActiveSlot = Arc<Mutex<Option<CancelToken>>>;

fn lock_slot(slot: &ActiveSlot) -> MutexGuard<'_, Option<CancelToken>> {
    // The slot holds a plain token; a poisoned lock is still usable
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs at most one download at a time on the given runtime.
///
/// Everything observable leaves through the event channel; the runner
/// never touches UI state.
pub struct DownloadRunner {
    backend: Arc<dyn MediaBackend>,
    settings: Settings,
    events: EventSender,
    handle: Handle,
    active: ActiveSlot,
}

impl DownloadRunner {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        settings: Settings,
        events: EventSender,
        handle: Handle,
    ) -> Self {
        Self {
            backend,
            settings,
            events,
            handle,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Launch the download for `request`. Returns immediately.
    pub fn start(&self, request: &DownloadRequest) -> Result<(), DownloadError> {
        let mut active = lock_slot(&self.active);
        if active.is_some() {
            tracing::warn!("[runner] Rejected {}: a download is already running", request.url());
            return Err(DownloadError::AlreadyRunning);
        }

        std::fs::create_dir_all(request.destination()).map_err(|e| {
            DownloadError::Io(format!(
                "Cannot create {}: {}",
                request.destination().display(),
                e
            ))
        })?;

        let token = CancelToken::new();
        *active = Some(token.clone());
        drop(active);

        let job = Job {
            backend: Arc::clone(&self.backend),
            url: request.url().to_string(),
            options: self.settings.library_options(request),
            watchdog: self.settings.watchdog(),
            token,
            events: self.events.clone(),
        };
        let guard = DoneGuard::new(self.events.clone(), Arc::clone(&self.active));

        tracing::info!(
            "[runner] Starting {} job with {}: {}",
            request.platform(),
            self.backend.name(),
            request.url()
        );
        self.handle.spawn(job.run(guard));
        Ok(())
    }

    /// Ask the running job to stop at its next hook call.
    ///
    /// Returns true when this call requested cancellation. No-op (and no
    /// event) when nothing runs or a cancel is already pending.
    pub fn cancel(&self) -> bool {
        let active = lock_slot(&self.active);
        match active.as_ref() {
            Some(token) if token.cancel() => {
                tracing::info!("[runner] Cancellation requested");
                self.events.info("Cancellation requested by user.");
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock_slot(&self.active).is_some()
    }

    /// Metadata-only extract, independent of the running job.
    pub async fn inspect(&self, url: &str) -> Result<VideoInfo, DownloadError> {
        let url = url.trim();
        let platform = platform::detect(url);
        if !platform.is_supported() {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        let options = self.settings.metadata_options(platform);
        tracing::info!("[runner] Inspecting {} via {}", url, self.backend.name());
        self.backend.extract_info(url, &options).await
    }
}

/// Sends the terminal `Done` exactly once, however the job task ends.
///
/// Dropped without an outcome (task aborted, runtime shut down) it still
/// reports a failure.
struct DoneGuard {
    events: EventSender,
    active: ActiveSlot,
    outcome: Option<JobOutcome>,
}

impl DoneGuard {
    fn new(events: EventSender, active: ActiveSlot) -> Self {
        Self {
            events,
            active,
            outcome: None,
        }
    }

    fn finish(mut self, outcome: JobOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        // Free the slot first so a `start` issued after `Done` is accepted
        lock_slot(&self.active).take();

        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| JobOutcome::Failed("Download task ended unexpectedly".to_string()));
        tracing::debug!("[runner] Job done: {:?}", outcome);
        self.events.done(outcome);
    }
}

struct Job {
    backend: Arc<dyn MediaBackend>,
    url: String,
    options: LibraryOptions,
    watchdog: Option<Duration>,
    token: CancelToken,
    events: EventSender,
}

impl Job {
    async fn run(self, guard: DoneGuard) {
        self.events.info(format!("Starting download for: {}", self.url));

        let mut hooks = JobHooks::new(self.token.clone(), self.events.clone());
        let backend = Arc::clone(&self.backend);
        let url = self.url.clone();
        let options = self.options.clone();

        // Separate task so a panic inside the library surfaces as a JoinError
        let mut download =
            tokio::spawn(async move { backend.download(&url, &options, &mut hooks).await });

        let joined = match self.watchdog {
            Some(limit) => {
                tokio::select! {
                    joined = &mut download => Some(joined),
                    _ = tokio::time::sleep(limit) => None,
                }
            }
            None => Some((&mut download).await),
        };

        let outcome = match joined {
            Some(joined) => self.classify(joined),
            None => {
                let secs = self.watchdog.map(|d| d.as_secs()).unwrap_or_default();
                self.token.cancel();
                // Dropping the library future stops it (and kills any child process)
                download.abort();
                // Nothing from this job may follow its Done
                let _ = download.await;
                self.fail(format!("Download timed out after {}s", secs))
            }
        };

        guard.finish(outcome);
    }

    fn classify(&self, joined: Result<Result<(), DownloadError>, JoinError>) -> JobOutcome {
        match joined {
            Ok(Ok(())) => {
                tracing::info!("[runner] Finished: {}", self.url);
                self.events.info("Download completed successfully.");
                JobOutcome::Finished
            }
            Ok(Err(e)) if e.is_cancellation() || self.token.is_cancelled() => {
                tracing::info!("[runner] Cancelled: {} ({})", self.url, e);
                self.events.info("Download cancelled.");
                JobOutcome::Cancelled
            }
            Ok(Err(e)) => self.fail(e.detail()),
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                self.fail(format!("Unexpected error: {}", message))
            }
            Err(_) => self.fail("Download task aborted".to_string()),
        }
    }

    fn fail(&self, message: String) -> JobOutcome {
        tracing::error!("[runner] Failed: {}: {}", self.url, message);
        self.events.log(LogLevel::Error, format!("ERROR: {}", message));
        JobOutcome::Failed(message)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in download task".to_string()
    }
}
