pub mod config;
pub mod downloader;
pub mod logging;

pub use config::Settings;
pub use downloader::{
    DownloadController, DownloadError, JobOutcome, JobState, MediaFormat, ProgressEvent, Quality,
};
