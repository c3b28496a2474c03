//! Progress UI (bar) for download batches, driven by engine progress events.

use std::time::Duration;

use image_downloader_core::{DownloadOutcome, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use url::Url;

/// Spawns the progress UI when requested.
///
/// Returns the sender to hand to the engine and the UI task handle. When
/// `use_bar` is false both are `None` and the engine emits nothing.
pub(crate) fn spawn_progress_ui(
    use_bar: bool,
) -> (
    Option<UnboundedSender<ProgressEvent>>,
    Option<tokio::task::JoinHandle<()>>,
) {
    if !use_bar {
        return (None, None);
    }
    let (sender, receiver) = unbounded_channel();
    let handle = tokio::spawn(run_progress_bar(receiver));
    (Some(sender), Some(handle))
}

async fn run_progress_bar(mut receiver: UnboundedReceiver<ProgressEvent>) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_bar} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    while let Some(event) = receiver.recv().await {
        match event {
            ProgressEvent::BatchStarted { total } => {
                bar.set_length(u64::try_from(total).unwrap_or(u64::MAX));
            }
            ProgressEvent::ItemStarted { url, .. } => {
                bar.set_message(format!("Downloading from {}...", host_label(&url)));
            }
            ProgressEvent::ItemFinished { outcome, url, .. } => {
                if let DownloadOutcome::Failure { reason } = &outcome {
                    bar.println(format!("Failed {url}: {reason}"));
                }
                bar.inc(1);
            }
            ProgressEvent::BatchFinished { .. } => break,
        }
    }

    bar.finish_and_clear();
}

fn host_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(std::string::ToString::to_string))
        .unwrap_or_else(|| "image".to_string())
}
