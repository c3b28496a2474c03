//! Composition of one CLI run: config, tracing, discovery and download.

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use image_downloader_core::{
    CancelFlag, Discoverer, DownloadEngine, FileConfig, HttpClient, IdentityPool, ImageCandidates,
    Pacer, RetryPolicy, load_default_file_config,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::config_runtime::{self, DiscoverySettings, DownloadSettings};
use crate::app::{exit_handler, output, progress_manager, selection, terminal};
use crate::cli::{Cli, Command, DiscoverArgs, DownloadArgs};

pub(crate) async fn run_image_downloader() -> Result<ProcessExit> {
    let cli = Cli::parse();

    let loaded_config = load_default_file_config()?;
    let file_config = loaded_config.config.as_ref();
    let file_verbosity = file_config.and_then(|cfg| cfg.verbosity);

    let default_level =
        config_runtime::resolve_default_log_level(cli.verbose, cli.quiet, file_verbosity);
    terminal::init_tracing(
        default_level,
        config_runtime::should_force_cli_log_level(cli.verbose, cli.quiet),
    );
    debug!(?cli, "CLI arguments parsed");
    if let Some(path) = &loaded_config.path {
        debug!(
            path = %path.display(),
            loaded = loaded_config.loaded_from_file(),
            "config file resolved"
        );
    }

    let quiet = config_runtime::is_quiet(cli.quiet, cli.verbose, file_verbosity);
    match &cli.command {
        Command::Discover(args) => run_discover(args, file_config).await,
        Command::Download(args) => run_download(args, file_config, quiet).await,
    }
}

async fn run_discover(args: &DiscoverArgs, file_config: Option<&FileConfig>) -> Result<ProcessExit> {
    let settings = config_runtime::resolve_discover_settings(args, file_config);
    let (_, discoverer) = build_discoverer(&settings)?;
    let candidates = discover(&discoverer, &args.url, &settings).await?;
    output::print_candidates(&candidates, args.json)?;
    Ok(ProcessExit::Success)
}

async fn run_download(
    args: &DownloadArgs,
    file_config: Option<&FileConfig>,
    quiet: bool,
) -> Result<ProcessExit> {
    let settings = config_runtime::resolve_download_settings(args, file_config)?;
    let (client, discoverer) = build_discoverer(&settings.discovery)?;
    let candidates = discover(&discoverer, &args.url, &settings.discovery).await?;

    if !args.json && !quiet {
        output::print_candidates(&candidates, false)?;
    }
    if candidates.is_empty() {
        info!("No images found; nothing to download");
        return Ok(ProcessExit::Success);
    }

    let urls = selection::select_urls(candidates.as_slice(), args.pick.as_deref())?;
    let engine = build_engine(&settings)?;

    let cancel = CancelFlag::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_signal.cancel();
        }
    });

    let use_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        quiet || args.json,
        terminal::is_dumb_terminal(),
    );
    let (events, progress_handle) = progress_manager::spawn_progress_ui(use_bar);

    let summary = engine
        .download_batch(
            &client,
            &urls,
            settings.format,
            &settings.output_dir,
            &cancel,
            events,
        )
        .await
        .context("download batch failed")?;

    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    output::print_summary(&summary, args.json, quiet)?;

    if cancel.is_cancelled() {
        warn!(
            successful = summary.successful,
            total = summary.total(),
            "Interrupted before every image was downloaded"
        );
    }

    Ok(exit_handler::determine_exit_outcome(
        summary.successful,
        summary.failed,
    ))
}

async fn discover(
    discoverer: &Discoverer,
    target: &str,
    settings: &DiscoverySettings,
) -> Result<ImageCandidates> {
    let candidates = discoverer.discover(target, settings.mode).await?;
    info!(count = candidates.len(), "Discovery finished");
    Ok(candidates)
}

fn build_discoverer(settings: &DiscoverySettings) -> Result<(HttpClient, Discoverer)> {
    let identities = Arc::new(IdentityPool::default());
    let client = HttpClient::with_settings(
        Arc::clone(&identities),
        settings.fetch_timeout,
        settings.probe_timeout,
    )
    .context("failed to build HTTP client")?;

    let discoverer = with_renderer(Discoverer::new(client.clone()), identities, settings);
    Ok((client, discoverer))
}

#[cfg(feature = "headless")]
fn with_renderer(
    discoverer: Discoverer,
    identities: Arc<IdentityPool>,
    settings: &DiscoverySettings,
) -> Discoverer {
    use image_downloader_core::DynamicExtractor;
    use image_downloader_core::discovery::ChromiumEngine;

    let no_sandbox = std::env::var_os("IMAGE_DOWNLOADER_NO_SANDBOX").is_some();
    let engine = ChromiumEngine::new().no_sandbox(no_sandbox);
    discoverer.with_renderer(DynamicExtractor::new(
        Arc::new(engine),
        identities,
        settings.render.clone(),
    ))
}

#[cfg(not(feature = "headless"))]
fn with_renderer(
    discoverer: Discoverer,
    _identities: Arc<IdentityPool>,
    _settings: &DiscoverySettings,
) -> Discoverer {
    discoverer
}

fn build_engine(settings: &DownloadSettings) -> Result<DownloadEngine> {
    let pacer = match settings.pacing {
        Some((min, max)) => {
            debug!(
                pacing_min_ms = min.as_millis(),
                pacing_max_ms = max.as_millis(),
                "pacing enabled"
            );
            Pacer::new(min, max)
        }
        None => {
            debug!("pacing disabled");
            Pacer::disabled()
        }
    };
    DownloadEngine::new(
        settings.concurrency,
        RetryPolicy::with_max_attempts(settings.max_retries),
        Arc::new(pacer),
    )
    .context("invalid download engine configuration")
}
