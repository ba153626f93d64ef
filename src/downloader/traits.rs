// Seam to the external download/extraction library

use async_trait::async_trait;

use super::errors::DownloadError;
use super::hooks::JobHooks;
use super::models::{LibraryOptions, VideoInfo};

/// A download library the runner can drive.
///
/// Implementations call `hooks.progress.on_update` for every transfer
/// callback and must abort and return its error when it fails; that is how
/// cancellation reaches them.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Metadata-only extract. Used as a pre-flight check.
    async fn extract_info(&self, url: &str, options: &LibraryOptions) -> Result<VideoInfo, DownloadError>;

    /// Download a single URL. Retries and timeouts are the library's own,
    /// configured through `options`.
    async fn download(
        &self,
        url: &str,
        options: &LibraryOptions,
        hooks: &mut JobHooks,
    ) -> Result<(), DownloadError>;
}
