use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use mediaslayer::downloader::models::LogLevel;
use mediaslayer::downloader::FormatSelector;
use mediaslayer::{logging, DownloadController, JobOutcome, ProgressEvent, Settings};

#[derive(Parser, Debug)]
#[command(name = "mediaslayer")]
#[command(author, version, about = "Download video or audio from YouTube and X/Twitter", long_about = None)]
struct Args {
    /// Media URL (youtube.com, youtu.be, x.com, twitter.com, t.co)
    url: String,

    /// Output format: MP4, WebM, MP3 or WAV
    #[arg(short, long, default_value = "MP4")]
    format: String,

    /// Quality ceiling: 1080p, 720p, 480p, 360p; anything else means best
    #[arg(short, long, default_value = "720p")]
    quality: String,

    /// Destination directory (default: from settings)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Only show metadata and available qualities
    #[arg(long)]
    info: bool,

    /// Settings file (default: <config dir>/mediaslayer/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let args = Args::parse();

    let settings = match args.config.clone().or_else(Settings::default_path) {
        Some(path) => Settings::load(&path).context("loading settings")?,
        None => Settings::default(),
    };
    let destination = args.dest.clone().unwrap_or_else(|| settings.download_dir.clone());

    let mut controller = DownloadController::with_ytdlp(settings, Handle::current());

    if args.info {
        return show_info(&controller, &args.url).await;
    }

    controller
        .submit_labels(&args.url, &args.format, &args.quality, &destination)
        .with_context(|| format!("cannot start download of {}", args.url))?;

    let mut tick = tokio::time::interval(Duration::from_millis(100));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                controller.cancel();
            }
        }

        for event in controller.pump(Instant::now()) {
            print_event(&event);
        }
        if !controller.state().is_active() {
            break;
        }
    }

    match controller.outcome() {
        Some(JobOutcome::Finished) => {
            println!("Saved to {}", destination.display());
            Ok(())
        }
        Some(JobOutcome::Cancelled) => Ok(()),
        Some(JobOutcome::Failed(message)) => bail!("download failed: {}", message),
        None => bail!("download ended without an outcome"),
    }
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Progress(percent) => {
            eprint!("\r[{:<30}] {:5.1}%", "#".repeat((*percent / 100.0 * 30.0) as usize), percent);
            let _ = std::io::stderr().flush();
        }
        ProgressEvent::LogLine(line) => match line.level {
            LogLevel::Error | LogLevel::Warning => eprintln!("\n{}", line.message),
            _ => println!("{}", line.message),
        },
        ProgressEvent::Done(_) => eprintln!(),
    }
}

async fn show_info(controller: &DownloadController, url: &str) -> Result<()> {
    let info = controller
        .runner()
        .inspect(url)
        .await
        .with_context(|| format!("cannot read metadata for {}", url))?;

    println!("Title:    {}", info.title);
    println!("Uploader: {}", info.uploader);
    println!("Duration: {}", info.duration_label());

    let qualities: Vec<String> = FormatSelector::available_qualities(&info.formats)
        .iter()
        .map(|q| q.to_string())
        .collect();
    println!("Qualities: {}", qualities.join(", "));
    println!("Recommended: {}", FormatSelector::recommend_quality(&info.formats));
    Ok(())
}
