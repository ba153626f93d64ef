// Download orchestration core

pub mod backends;
pub mod controller;
pub mod errors;
pub mod events;
pub mod format_selector;
pub mod hooks;
pub mod models;
pub mod platform;
pub mod runner;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::DownloadController;
pub use errors::DownloadError;
pub use events::{EventReceiver, EventSender};
pub use format_selector::{AudioCodec, FormatSelector, MediaFormat, Quality};
pub use hooks::{CancelToken, JobHooks, LogShim, ProgressHook};
pub use models::{
    DownloadRequest, JobOutcome, JobState, LibraryOptions, LogLevel, LogLine, ProgressEvent,
    VideoInfo,
};
pub use platform::Platform;
pub use runner::DownloadRunner;
pub use traits::MediaBackend;
