// Scripted stand-in for the download library, for unit tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::errors::DownloadError;
use super::hooks::JobHooks;
use super::models::{LibraryOptions, TransferUpdate, VideoInfo};
use super::traits::MediaBackend;

#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Feed these callbacks to the hook, then succeed
    Succeed(Vec<TransferUpdate>),
    /// Feed these callbacks, then fail with library output
    Fail(Vec<TransferUpdate>, String),
    Panic,
    /// Keep reporting 1% until the hook raises
    BlockUntilCancelled,
    /// Ignore the hook entirely and sleep
    Hang,
    /// Ignore the hook and keep logging
    Chatty,
}

pub(crate) struct ScriptedBackend {
    script: Script,
    info: Option<VideoInfo>,
    calls: Arc<AtomicUsize>,
    last_options: std::sync::Mutex<Option<LibraryOptions>>,
}

impl ScriptedBackend {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            info: None,
            calls: Arc::new(AtomicUsize::new(0)),
            last_options: std::sync::Mutex::new(None),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::new(Script::Succeed(vec![
            TransferUpdate::downloading(0, Some(1000)),
            TransferUpdate::downloading(250, Some(1000)),
            TransferUpdate::downloading(600, Some(1000)),
            TransferUpdate::downloading(1000, Some(1000)),
            TransferUpdate::finished(),
        ]))
    }

    pub(crate) fn with_info(mut self, info: VideoInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_options(&self) -> Option<LibraryOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

async fn feed(updates: &[TransferUpdate], hooks: &mut JobHooks) -> Result<(), DownloadError> {
    for update in updates {
        hooks.progress.on_update(update)?;
        tokio::task::yield_now().await;
    }
    Ok(())
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract_info(&self, url: &str, _options: &LibraryOptions) -> Result<VideoInfo, DownloadError> {
        self.info
            .clone()
            .ok_or_else(|| DownloadError::Unavailable(format!("no metadata for {}", url)))
    }

    async fn download(
        &self,
        url: &str,
        options: &LibraryOptions,
        hooks: &mut JobHooks,
    ) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());
        hooks.logger.debug(&format!("[youtube] Extracting URL: {}", url));

        match &self.script {
            Script::Succeed(updates) => {
                feed(updates, hooks).await?;
                hooks.logger.info("[download] Destination: Someone - A video.mp4");
                Ok(())
            }
            Script::Fail(updates, output) => {
                feed(updates, hooks).await?;
                Err(DownloadError::from_library_output(output))
            }
            Script::Panic => panic!("library blew up"),
            Script::BlockUntilCancelled => loop {
                hooks.progress.on_update(&TransferUpdate::downloading(1, Some(100)))?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            },
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            Script::Chatty => loop {
                hooks.logger.info("[download] still going");
                tokio::time::sleep(Duration::from_millis(1)).await;
            },
        }
    }
}

/// Write an executable `yt-dlp` stand-in: a `/bin/sh` script with `body`.
#[cfg(unix)]
pub(crate) fn fake_ytdlp(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("yt-dlp");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
