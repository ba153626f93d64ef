use async_trait::async_trait;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::BufReader;
use tokio::process::Command;

use crate::downloader::errors::DownloadError;
use crate::downloader::hooks::JobHooks;
use crate::downloader::models::{FormatEntry, LibraryOptions, TransferStatus, TransferUpdate, VideoInfo};
use crate::downloader::traits::MediaBackend;
use crate::downloader::utils::{
    network_args, next_line_lossy, proxy_args, run_output_with_timeout, spawn_error,
};

/// Marker for our machine-readable progress lines
const PROGRESS_TAG: &str = "[mediaslayer]";

/// `--progress-template` producing `[mediaslayer]|status|downloaded|total|estimate|percent`
const PROGRESS_TEMPLATE: &str = "download:[mediaslayer]|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress._percent_str)s";

lazy_static::lazy_static! {
    // Human-readable fallback, e.g.
    // [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
    static ref PROGRESS_RE: Regex = Regex::new(r"^\[download\]\s+(\d+\.?\d*)%").unwrap();
    static ref ALREADY_RE: Regex = Regex::new(r"has already been downloaded").unwrap();
}

/// One line of yt-dlp stdout, classified
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(TransferUpdate),
    Info(String),
    Debug(String),
}

/// Drives the `yt-dlp` executable
pub struct YtDlpBackend {
    binary: PathBuf,
}

impl YtDlpBackend {
    pub fn new(binary_override: Option<PathBuf>) -> Self {
        let binary = binary_override.unwrap_or_else(find_ytdlp);
        tracing::debug!("[yt-dlp] Using binary {}", binary.display());
        Self { binary }
    }
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract_info(&self, url: &str, options: &LibraryOptions) -> Result<VideoInfo, DownloadError> {
        let args = build_info_args(url, options);
        let timeout_secs = u64::from(options.socket_timeout_secs.max(15)) * 2 + 30;

        let output = run_output_with_timeout(&self.binary, &args, timeout_secs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::from_library_output(&stderr));
        }

        parse_video_info(&output.stdout)
    }

    async fn download(
        &self,
        url: &str,
        options: &LibraryOptions,
        hooks: &mut JobHooks,
    ) -> Result<(), DownloadError> {
        let args = build_download_args(url, options);
        tracing::info!("[yt-dlp] Starting: {} (format {})", url, options.format_expression);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.binary, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stderr".to_string()))?;

        // Errors are collected for classification; the runner logs them once
        let logger = hooks.logger.clone();
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut errors = Vec::new();
            while let Ok(Some(line)) = next_line_lossy(&mut reader, &mut buf).await {
                if line.starts_with("ERROR:") {
                    errors.push(line);
                } else if line.starts_with("WARNING:") {
                    logger.warning(&line);
                } else {
                    logger.debug(&line);
                }
            }
            errors.join("\n")
        });

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let streamed: Result<(), DownloadError> = async {
            while let Some(line) = next_line_lossy(&mut reader, &mut buf).await? {
                match parse_output_line(&line) {
                    OutputLine::Progress(update) => hooks.progress.on_update(&update)?,
                    OutputLine::Info(text) => {
                        if hooks.progress.is_cancelled() {
                            return Err(DownloadError::Cancelled);
                        }
                        hooks.logger.info(&text);
                    }
                    OutputLine::Debug(text) => hooks.logger.debug(&text),
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = streamed {
            tracing::info!("[yt-dlp] Stopping process: {}", e);
            let _ = child.kill().await;
            stderr_task.abort();
            return Err(e);
        }

        let status = child.wait().await?;
        let errors = stderr_task.await.unwrap_or_default();

        if status.success() {
            tracing::info!("[yt-dlp] Finished: {}", url);
            Ok(())
        } else if errors.is_empty() {
            Err(DownloadError::ExecutionError(format!("yt-dlp exited with {}", status)))
        } else {
            Err(DownloadError::from_library_output(&errors))
        }
    }
}

const COMMON_DIRS: [&str; 3] = [
    "/opt/homebrew/bin", // Homebrew on Apple Silicon
    "/usr/local/bin",    // Homebrew on Intel Mac
    "/usr/bin",          // System installation
];

/// Find yt-dlp: common install locations, then PATH, then the bare name
fn find_ytdlp() -> PathBuf {
    let bin_name = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    locate(bin_name, &COMMON_DIRS, std::env::var_os("PATH"), &cwd)
}

fn locate(bin_name: &str, common_dirs: &[&str], path_var: Option<OsString>, cwd: &Path) -> PathBuf {
    for dir in common_dirs {
        let candidate = Path::new(dir).join(bin_name);
        if candidate.exists() {
            return candidate;
        }
    }

    // Only executable candidates count
    which::which_in(bin_name, path_var, cwd).unwrap_or_else(|_| PathBuf::from(bin_name))
}

pub fn build_download_args(url: &str, options: &LibraryOptions) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        options.format_expression.clone(),
        "-P".to_string(),
        options.output_dir.to_string_lossy().to_string(),
        "-o".to_string(),
        options.output_template.clone(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
        "--no-colors".to_string(),
        "--abort-on-error".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
    ];
    args.extend(network_args(options));
    args.extend(proxy_args(options));

    if let Some(extractor_args) = &options.extractor_args {
        args.push("--extractor-args".to_string());
        args.push(extractor_args.clone());
    }

    if let Some(container) = &options.merge_output_format {
        args.push("--merge-output-format".to_string());
        args.push(container.clone());
    }

    if let Some(codec) = options.audio_codec {
        args.extend([
            "-x".to_string(),
            "--audio-format".to_string(),
            codec.as_str().to_string(),
        ]);
    }

    // Keep the URL last, after "--", so it is never read as an option
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

pub fn build_info_args(url: &str, options: &LibraryOptions) -> Vec<String> {
    let mut args = vec![
        "--dump-json".to_string(),
        "--skip-download".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
    ];
    args.extend(network_args(options));
    args.extend(proxy_args(options));
    if let Some(extractor_args) = &options.extractor_args {
        args.push("--extractor-args".to_string());
        args.push(extractor_args.clone());
    }
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

pub fn parse_output_line(line: &str) -> OutputLine {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix(PROGRESS_TAG) {
        if let Some(update) = parse_template_fields(rest) {
            return OutputLine::Progress(update);
        }
        return OutputLine::Debug(trimmed.to_string());
    }

    if ALREADY_RE.is_match(trimmed) {
        return OutputLine::Progress(TransferUpdate::finished());
    }

    if let Some(caps) = PROGRESS_RE.captures(trimmed) {
        return OutputLine::Progress(TransferUpdate {
            status: TransferStatus::Downloading,
            downloaded_bytes: None,
            total_bytes: None,
            total_bytes_estimate: None,
            percent_str: caps.get(1).map(|m| format!("{}%", m.as_str())),
        });
    }

    if trimmed.starts_with("[debug]") {
        OutputLine::Debug(trimmed.to_string())
    } else {
        OutputLine::Info(trimmed.to_string())
    }
}

/// `|status|downloaded|total|estimate|percent`; yt-dlp prints "NA" for unknowns
fn parse_template_fields(rest: &str) -> Option<TransferUpdate> {
    let mut fields = rest.strip_prefix('|')?.splitn(5, '|');

    let status = match fields.next()?.trim() {
        "downloading" => TransferStatus::Downloading,
        "finished" => TransferStatus::Finished,
        "error" => TransferStatus::Error,
        _ => return None,
    };
    let downloaded_bytes = parse_count(fields.next()?);
    let total_bytes = parse_count(fields.next()?);
    let total_bytes_estimate = parse_count(fields.next()?);
    let percent_str = fields
        .next()
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "NA")
        .map(str::to_string);

    Some(TransferUpdate {
        status,
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate,
        percent_str,
    })
}

/// Byte counters may come as "1234" or "1234.0"
fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}

fn parse_video_info(stdout: &[u8]) -> Result<VideoInfo, DownloadError> {
    let json_str = String::from_utf8_lossy(stdout);
    let json: serde_json::Value = serde_json::from_str(json_str.trim())
        .map_err(|e| DownloadError::ParseError(format!("JSON parse error: {}", e)))?;

    let formats = json["formats"]
        .as_array()
        .map(|formats| {
            formats
                .iter()
                .map(|f| FormatEntry {
                    format_id: f["format_id"].as_str().unwrap_or("").to_string(),
                    ext: f["ext"].as_str().unwrap_or("").to_string(),
                    height: f["height"].as_u64().map(|h| h as u32),
                    vcodec: f["vcodec"].as_str().map(str::to_string),
                    acodec: f["acodec"].as_str().map(str::to_string),
                    filesize: f["filesize"].as_u64().or_else(|| f["filesize_approx"].as_u64()),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(VideoInfo {
        id: json["id"].as_str().unwrap_or("").to_string(),
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
        duration_secs: json["duration"].as_f64().unwrap_or(0.0).max(0.0) as u64,
        thumbnail: json["thumbnail"].as_str().unwrap_or("").to_string(),
        formats,
    })
}
