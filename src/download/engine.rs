//! Download engine for concurrent image downloads with retry support.
//!
//! This module provides the `DownloadEngine` which runs a batch of selected
//! image URLs using a semaphore-based concurrency control pattern. Every
//! item paces itself, fetches with retry on transient failures, normalizes
//! the payload and writes it under a filename planned before the batch
//! starts.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use image_downloader_core::download::{
//!     CancelFlag, DownloadEngine, HttpClient, Pacer, RetryPolicy, TargetFormat,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(4, RetryPolicy::default(), Arc::new(Pacer::default()))?;
//! let client = HttpClient::new()?;
//! let urls = vec!["https://example.com/a.png".to_string()];
//! let summary = engine
//!     .download_batch(&client, &urls, TargetFormat::Jpg, Path::new("./images"), &CancelFlag::new(), None)
//!     .await?;
//! println!("{}", summary.message());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use super::encoder::{SVG_EXTENSION, TargetFormat, looks_like_svg, normalize};
use super::filename::{FilenamePlanner, filename_for_url, split_extension};
use super::pacing::{Pacer, parse_retry_after};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::{DownloadError, HttpClient};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 16;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Failure reason recorded for items skipped after cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Error type for download engine operations.
///
/// These abort the whole batch. Per-item failures never surface here; they
/// are recorded as [`DownloadOutcome::Failure`] in the summary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The destination directory could not be created.
    #[error("cannot create destination directory {path}: {source}")]
    Filesystem {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Created, nothing started.
    Pending,
    /// Items are being processed.
    Downloading,
    /// Every item succeeded.
    Completed,
    /// At least one item failed.
    PartiallyFailed,
    /// The cancel flag stopped the batch before every item ran.
    Cancelled,
}

/// Result of one requested URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The image was written to `path`.
    Success {
        /// Saved file.
        path: PathBuf,
    },
    /// The image could not be saved.
    Failure {
        /// Human-readable reason.
        reason: String,
    },
}

impl DownloadOutcome {
    /// Whether this outcome is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One planned item of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// 1-based position of the URL in the batch.
    pub position: usize,
    /// Image URL to fetch.
    pub url: String,
    /// Raster format non-SVG payloads are converted to.
    pub format: TargetFormat,
    /// Unique filename planned for this item.
    pub filename: String,
}

/// Outcome of one item, tagged with its position and URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    /// 1-based position of the URL in the batch.
    pub position: usize,
    /// The requested URL.
    pub url: String,
    /// What happened.
    pub outcome: DownloadOutcome,
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Number of saved images.
    pub successful: usize,
    /// Number of URLs that failed or were cancelled.
    pub failed: usize,
    /// Number of retry attempts made across the batch.
    pub retried: usize,
    /// Final state.
    pub state: BatchState,
    /// Per-item outcomes in request order.
    pub outcomes: Vec<ItemResult>,
}

impl BatchSummary {
    fn from_outcomes(outcomes: Vec<ItemResult>, retried: usize, cancelled: bool) -> Self {
        let successful = outcomes.iter().filter(|r| r.outcome.is_success()).count();
        let failed = outcomes.len() - successful;
        let state = if cancelled {
            BatchState::Cancelled
        } else if failed == 0 {
            BatchState::Completed
        } else {
            BatchState::PartiallyFailed
        };
        Self {
            successful,
            failed,
            retried,
            state,
            outcomes,
        }
    }

    /// Total number of requested URLs.
    #[must_use]
    pub fn total(&self) -> usize {
        self.successful + self.failed
    }

    /// The completion message shown to the user.
    #[must_use]
    pub fn message(&self) -> String {
        let mut message = format!(
            "Download complete. {} images downloaded successfully.",
            self.successful
        );
        if self.failed > 0 {
            message.push_str(&format!(" {} images failed.", self.failed));
        }
        message
    }
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The batch is about to process `total` URLs.
    BatchStarted {
        /// Number of URLs in the batch.
        total: usize,
    },
    /// An item acquired a slot and is starting.
    ItemStarted {
        /// 1-based position.
        position: usize,
        /// The item URL.
        url: String,
    },
    /// An item finished, successfully or not.
    ItemFinished {
        /// 1-based position.
        position: usize,
        /// The item URL.
        url: String,
        /// What happened.
        outcome: DownloadOutcome,
    },
    /// Emitted exactly once per batch, after every item.
    BatchFinished {
        /// The final summary.
        summary: BatchSummary,
    },
}

/// Shared flag that stops a running batch.
///
/// Items check the flag before starting and after pacing; items already
/// fetching run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
struct EventSink(Option<UnboundedSender<ProgressEvent>>);

impl EventSink {
    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.0 {
            // Receiver gone means nobody is watching; the batch carries on.
            let _ = sender.send(event);
        }
    }
}

/// Download engine for concurrent image downloads with retry support.
///
/// # Concurrency Model
///
/// - Each item runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each task
/// - Permits are released automatically when the task completes (RAII)
/// - Outcomes are collected by position, so completion order never matters
///
/// # Retry Behavior
///
/// - Transient errors (unreachable host, timeouts, 5xx) are retried with exponential backoff
/// - Retry-After headers are respected when servers return 429
/// - Permanent errors (404, undecodable payload, write failure) fail immediately
#[derive(Debug)]
pub struct DownloadEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
    pacer: Arc<Pacer>,
}

impl DownloadEngine {
    /// Creates a new download engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is
    /// outside the valid range (1-16).
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use image_downloader_core::download::{DownloadEngine, Pacer, RetryPolicy};
    ///
    /// let engine = DownloadEngine::new(4, RetryPolicy::default(), Arc::new(Pacer::disabled())).unwrap();
    /// assert_eq!(engine.concurrency(), 4);
    /// ```
    #[instrument(level = "debug", skip(retry_policy, pacer))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        pacer: Arc<Pacer>,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_retries = retry_policy.max_attempts(),
            pacing_min_ms = pacer.min().as_millis(),
            pacing_max_ms = pacer.max().as_millis(),
            pacing_disabled = pacer.is_disabled(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            pacer,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads `urls` into `output_dir`.
    ///
    /// This method:
    /// 1. Creates the destination directory
    /// 2. Plans a unique filename for every URL
    /// 3. Spawns one task per URL up to the concurrency limit
    /// 4. Paces, fetches with retry, normalizes and writes each image
    /// 5. Returns the summary once every task has finished
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Filesystem`] if the destination directory
    /// cannot be created, and [`EngineError::SemaphoreClosed`] if the
    /// semaphore is closed.
    ///
    /// Individual download failures do NOT cause this method to error.
    #[instrument(
        skip(self, client, urls, cancel, events),
        fields(count = urls.len(), format = %format, output_dir = %output_dir.display())
    )]
    pub async fn download_batch(
        &self,
        client: &HttpClient,
        urls: &[String],
        format: TargetFormat,
        output_dir: &Path,
        cancel: &CancelFlag,
        events: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<BatchSummary, EngineError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| EngineError::Filesystem {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let events = EventSink(events);
        let (requests, planner) = plan_batch(urls, format);
        let names = Arc::new(Mutex::new(planner));
        let retried = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(requests.len());

        info!(total = requests.len(), "starting batch");
        events.emit(ProgressEvent::BatchStarted {
            total: requests.len(),
        });

        for request in requests {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let position = request.position;
            let url = request.url.clone();
            let client = client.clone();
            let output_dir = output_dir.to_path_buf();
            let retry_policy = self.retry_policy.clone();
            let pacer = Arc::clone(&self.pacer);
            let cancel = cancel.clone();
            let events = events.clone();
            let retried = Arc::clone(&retried);
            let names = Arc::clone(&names);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let outcome = run_item(
                    &client,
                    &request,
                    &output_dir,
                    &names,
                    &retry_policy,
                    &pacer,
                    &cancel,
                    &events,
                    &retried,
                )
                .await;
                events.emit(ProgressEvent::ItemFinished {
                    position: request.position,
                    url: request.url.clone(),
                    outcome: outcome.clone(),
                });
                outcome
            });
            handles.push((position, url, handle));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        let mut outcomes = Vec::with_capacity(handles.len());
        for (position, url, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(position, url = %url, error = %e, "download task panicked");
                    DownloadOutcome::Failure {
                        reason: format!("download task failed: {e}"),
                    }
                }
            };
            outcomes.push(ItemResult {
                position,
                url,
                outcome,
            });
        }

        let was_cancelled = cancel.is_cancelled()
            && outcomes.iter().any(|r| {
                matches!(&r.outcome, DownloadOutcome::Failure { reason } if reason == CANCELLED_REASON)
            });
        let summary =
            BatchSummary::from_outcomes(outcomes, retried.load(Ordering::SeqCst), was_cancelled);
        info!(
            successful = summary.successful,
            failed = summary.failed,
            retried = summary.retried,
            state = ?summary.state,
            "batch complete"
        );
        events.emit(ProgressEvent::BatchFinished {
            summary: summary.clone(),
        });
        Ok(summary)
    }
}

/// Plans one [`DownloadRequest`] per URL with batch-unique filenames.
///
/// URLs ending in `.svg` are planned with the `svg` extension since they
/// are saved verbatim.
#[must_use]
pub fn plan_requests(urls: &[String], format: TargetFormat) -> Vec<DownloadRequest> {
    plan_batch(urls, format).0
}

/// Plans the batch and hands back the planner so later renames stay unique.
fn plan_batch(urls: &[String], format: TargetFormat) -> (Vec<DownloadRequest>, FilenamePlanner) {
    let mut planner = FilenamePlanner::new();
    let requests = urls
        .iter()
        .enumerate()
        .map(|(index, url)| {
            let position = index + 1;
            let extension = if looks_like_svg(url, &[]) {
                SVG_EXTENSION
            } else {
                format.extension()
            };
            let filename = planner.claim(&filename_for_url(url, position, extension));
            DownloadRequest {
                position,
                url: url.clone(),
                format,
                filename,
            }
        })
        .collect();
    (requests, planner)
}

#[allow(clippy::too_many_arguments)]
#[instrument(
    skip(client, request, output_dir, names, policy, pacer, cancel, events, retried),
    fields(position = request.position, url = %request.url)
)]
async fn run_item(
    client: &HttpClient,
    request: &DownloadRequest,
    output_dir: &Path,
    names: &Mutex<FilenamePlanner>,
    policy: &RetryPolicy,
    pacer: &Pacer,
    cancel: &CancelFlag,
    events: &EventSink,
    retried: &AtomicUsize,
) -> DownloadOutcome {
    if cancel.is_cancelled() {
        return cancelled();
    }
    events.emit(ProgressEvent::ItemStarted {
        position: request.position,
        url: request.url.clone(),
    });

    pacer.pause().await;
    if cancel.is_cancelled() {
        return cancelled();
    }

    match save_image(client, request, output_dir, names, policy, retried).await {
        Ok(path) => {
            info!(path = %path.display(), "image saved");
            DownloadOutcome::Success { path }
        }
        Err(e) => {
            warn!(error = %e, "image download failed");
            DownloadOutcome::Failure {
                reason: e.to_string(),
            }
        }
    }
}

fn cancelled() -> DownloadOutcome {
    debug!("skipping item after cancellation");
    DownloadOutcome::Failure {
        reason: CANCELLED_REASON.to_string(),
    }
}

async fn save_image(
    client: &HttpClient,
    request: &DownloadRequest,
    output_dir: &Path,
    names: &Mutex<FilenamePlanner>,
    policy: &RetryPolicy,
    retried: &AtomicUsize,
) -> Result<PathBuf, DownloadError> {
    let bytes = fetch_with_retry(client, &request.url, policy, retried).await?;

    let url = request.url.clone();
    let format = request.format;
    let normalized = tokio::task::spawn_blocking(move || normalize(bytes, &url, format))
        .await
        .map_err(|e| {
            DownloadError::io(
                output_dir,
                std::io::Error::other(format!("image conversion task failed: {e}")),
            )
        })??;

    let (stem, planned_extension) = split_extension(&request.filename);
    let filename = if planned_extension == Some(normalized.extension) {
        request.filename.clone()
    } else {
        let renamed = format!("{stem}.{}", normalized.extension);
        let claimed = names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .claim(&renamed);
        debug!(planned = %request.filename, saved = %claimed, "extension changed after sniffing");
        claimed
    };
    let path = output_dir.join(filename);

    tokio::fs::write(&path, &normalized.bytes)
        .await
        .map_err(|e| DownloadError::io(&path, e))?;
    Ok(path)
}

/// Extracts and parses the Retry-After delay from a rate-limited error.
fn retry_after_delay(error: &DownloadError) -> Option<Duration> {
    let DownloadError::HttpStatus {
        retry_after: Some(header),
        ..
    } = error
    else {
        return None;
    };
    let delay = parse_retry_after(header)?;
    debug!(retry_after = %header, delay_ms = delay.as_millis(), "using Retry-After header delay");
    Some(delay)
}

/// Fetches with retry logic for transient errors.
async fn fetch_with_retry(
    client: &HttpClient,
    url: &str,
    policy: &RetryPolicy,
    retried: &AtomicUsize,
) -> Result<Vec<u8>, DownloadError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting fetch");

        let error = match client.fetch(url).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };

        let failure_type = classify_error(&error);
        let server_delay = if failure_type == FailureType::RateLimited {
            retry_after_delay(&error)
        } else {
            None
        };

        match policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry {
                delay: backoff_delay,
                attempt: next_attempt,
            } => {
                let delay = server_delay.unwrap_or(backoff_delay);
                info!(
                    url = %url,
                    attempt = next_attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    using_retry_after = server_delay.is_some(),
                    error = %error,
                    "retrying fetch"
                );
                retried.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(url = %url, %reason, attempts = attempt, "not retrying fetch");
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn disabled_pacer() -> Arc<Pacer> {
        Arc::new(Pacer::disabled())
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        let engine = DownloadEngine::new(1, RetryPolicy::default(), disabled_pacer()).unwrap();
        assert_eq!(engine.concurrency(), 1);

        let engine = DownloadEngine::new(16, RetryPolicy::default(), disabled_pacer()).unwrap();
        assert_eq!(engine.concurrency(), 16);
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        assert!(matches!(
            DownloadEngine::new(0, RetryPolicy::default(), disabled_pacer()),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            DownloadEngine::new(17, RetryPolicy::default(), disabled_pacer()),
            Err(EngineError::InvalidConcurrency { value: 17 })
        ));
    }

    #[test]
    fn test_engine_stores_retry_policy() {
        let engine =
            DownloadEngine::new(4, RetryPolicy::with_max_attempts(5), disabled_pacer()).unwrap();
        assert_eq!(engine.retry_policy().max_attempts(), 5);
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains("16"));
    }

    #[test]
    fn test_plan_requests_suffixes_collisions_in_order() {
        let planned = plan_requests(
            &urls(&[
                "https://a.test/img/cat.png",
                "https://b.test/other/cat.jpg",
                "https://c.test/Cat.gif",
                "https://d.test/",
            ]),
            TargetFormat::Jpg,
        );
        let names: Vec<_> = planned.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["cat.jpg", "cat_2.jpg", "Cat_3.jpg", "image_4.jpg"]);
        assert_eq!(planned[3].position, 4);
    }

    #[test]
    fn test_plan_requests_keeps_svg_extension() {
        let planned = plan_requests(&urls(&["https://a.test/logo.svg"]), TargetFormat::Png);
        assert_eq!(planned[0].filename, "logo.svg");
    }

    #[test]
    fn test_plan_batch_planner_rejects_names_already_planned() {
        let (planned, mut planner) = plan_batch(
            &urls(&["https://a.test/logo.svg", "https://a.test/logo.png"]),
            TargetFormat::Jpg,
        );
        assert_eq!(planned[1].filename, "logo.jpg");
        assert_eq!(planner.claim("logo.svg"), "logo_2.svg");
        assert_eq!(planner.claim("LOGO.jpg"), "LOGO_2.jpg");
    }

    #[test]
    fn test_summary_message_without_failures() {
        let summary = BatchSummary::from_outcomes(
            vec![ItemResult {
                position: 1,
                url: "https://a.test/a.png".to_string(),
                outcome: DownloadOutcome::Success {
                    path: PathBuf::from("a.jpg"),
                },
            }],
            0,
            false,
        );
        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(
            summary.message(),
            "Download complete. 1 images downloaded successfully."
        );
    }

    #[test]
    fn test_summary_message_with_failures() {
        let outcomes = vec![
            ItemResult {
                position: 1,
                url: "https://a.test/a.png".to_string(),
                outcome: DownloadOutcome::Success {
                    path: PathBuf::from("a.jpg"),
                },
            },
            ItemResult {
                position: 2,
                url: "https://a.test/b.png".to_string(),
                outcome: DownloadOutcome::Failure {
                    reason: "HTTP 404".to_string(),
                },
            },
        ];
        let summary = BatchSummary::from_outcomes(outcomes, 0, false);
        assert_eq!(summary.state, BatchState::PartiallyFailed);
        assert_eq!(summary.total(), 2);
        assert_eq!(
            summary.message(),
            "Download complete. 1 images downloaded successfully. 1 images failed."
        );
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_batch_reports_every_item() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let engine = DownloadEngine::new(2, RetryPolicy::no_retry(), disabled_pacer()).unwrap();
        let client = HttpClient::new().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let summary = engine
            .download_batch(
                &client,
                &urls(&["http://127.0.0.1:1/a.png", "http://127.0.0.1:1/b.png"]),
                TargetFormat::Jpg,
                temp_dir.path(),
                &cancel,
                Some(tx),
            )
            .await
            .unwrap();

        assert_eq!(summary.state, BatchState::Cancelled);
        assert_eq!(summary.failed, 2);
        assert!(summary.outcomes.iter().all(|r| matches!(
            &r.outcome,
            DownloadOutcome::Failure { reason } if reason == CANCELLED_REASON
        )));

        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ProgressEvent::BatchFinished { .. }) {
                finished += 1;
            }
        }
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn test_destination_directory_failure_is_fatal() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let engine = DownloadEngine::new(1, RetryPolicy::no_retry(), disabled_pacer()).unwrap();
        let client = HttpClient::new().unwrap();
        let result = engine
            .download_batch(
                &client,
                &urls(&["https://a.test/a.png"]),
                TargetFormat::Jpg,
                &blocker.join("nested"),
                &CancelFlag::new(),
                None,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Filesystem { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_item_is_paced_before_its_request() {
        let min = Duration::from_millis(500);
        let max = Duration::from_millis(1500);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let pacer = Arc::new(Pacer::seeded(min, max, 7));
        let engine = DownloadEngine::new(2, RetryPolicy::no_retry(), Arc::clone(&pacer)).unwrap();
        let client = HttpClient::new().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        // Unparseable URLs fail without touching the network, so only the
        // pacing sleeps advance the clock.
        let started = tokio::time::Instant::now();
        let summary = engine
            .download_batch(
                &client,
                &urls(&["not a url 1", "not a url 2", "not a url 3"]),
                TargetFormat::Jpg,
                temp_dir.path(),
                &CancelFlag::new(),
                Some(tx),
            )
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(summary.failed, 3);
        let mut item_started = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ProgressEvent::ItemStarted { .. }) {
                item_started += 1;
            }
        }
        assert_eq!(item_started, 3);

        // The first two items draw delays together. The third gets a permit
        // when the shorter of them finishes, then draws its own.
        let twin = Pacer::seeded(min, max, 7);
        let (a, b, c) = (twin.next_delay(), twin.next_delay(), twin.next_delay());
        let expected = a.max(b).max(a.min(b) + c);
        assert!(expected >= min * 2);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(20),
            "expected about {expected:?}, took {elapsed:?}"
        );
        assert_eq!(pacer.next_delay(), twin.next_delay());
    }
}
