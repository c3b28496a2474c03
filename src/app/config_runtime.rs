//! Merge of CLI flags, file config and built-in defaults.
//!
//! Precedence is always: explicit CLI flag, then config file, then default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use image_downloader_core::discovery::{DEFAULT_MAX_SCROLL_ITERATIONS, RenderSettings};
use image_downloader_core::download::{
    DEFAULT_PACING_MAX, DEFAULT_PACING_MIN, FETCH_TIMEOUT_SECS, PROBE_TIMEOUT_SECS,
};
use image_downloader_core::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DiscoveryMode, FileConfig, TargetFormat,
    VerbositySetting,
};

use crate::cli::{DiscoverArgs, DownloadArgs};

const DEFAULT_OUTPUT_DIR: &str = ".";

/// Settings shared by both subcommands: how discovery reaches the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiscoverySettings {
    pub(crate) mode: DiscoveryMode,
    pub(crate) fetch_timeout: Duration,
    pub(crate) probe_timeout: Duration,
    pub(crate) render: RenderSettings,
}

/// Effective settings of a `download` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DownloadSettings {
    pub(crate) discovery: DiscoverySettings,
    pub(crate) output_dir: PathBuf,
    pub(crate) format: TargetFormat,
    pub(crate) concurrency: usize,
    pub(crate) max_retries: u32,
    /// `None` disables pacing.
    pub(crate) pacing: Option<(Duration, Duration)>,
}

fn resolve_discovery(cli_render: bool, file_config: Option<&FileConfig>) -> DiscoverySettings {
    let file_render = file_config.and_then(|cfg| cfg.render).unwrap_or(false);
    let mode = if cli_render || file_render {
        DiscoveryMode::Rendered
    } else {
        DiscoveryMode::Static
    };

    let fetch_secs = file_config
        .and_then(|cfg| cfg.fetch_timeout_secs)
        .unwrap_or(FETCH_TIMEOUT_SECS);
    let probe_secs = file_config
        .and_then(|cfg| cfg.probe_timeout_secs)
        .unwrap_or(PROBE_TIMEOUT_SECS);
    let max_scroll_iterations = file_config
        .and_then(|cfg| cfg.max_scroll_iterations)
        .unwrap_or(DEFAULT_MAX_SCROLL_ITERATIONS);

    DiscoverySettings {
        mode,
        fetch_timeout: Duration::from_secs(fetch_secs),
        probe_timeout: Duration::from_secs(probe_secs),
        render: RenderSettings {
            max_scroll_iterations,
            ..RenderSettings::default()
        },
    }
}

pub(crate) fn resolve_discover_settings(
    args: &DiscoverArgs,
    file_config: Option<&FileConfig>,
) -> DiscoverySettings {
    resolve_discovery(args.render, file_config)
}

pub(crate) fn resolve_download_settings(
    args: &DownloadArgs,
    file_config: Option<&FileConfig>,
) -> Result<DownloadSettings> {
    let discovery = resolve_discovery(args.render, file_config);

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.and_then(|cfg| cfg.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let format = args
        .format
        .or_else(|| file_config.and_then(|cfg| cfg.format))
        .unwrap_or_default();
    let concurrency = args
        .concurrency
        .or_else(|| file_config.and_then(|cfg| cfg.concurrency))
        .map_or(DEFAULT_CONCURRENCY, usize::from);
    let max_retries = args
        .max_retries
        .or_else(|| file_config.and_then(|cfg| cfg.max_retries))
        .unwrap_or(DEFAULT_MAX_RETRIES);

    let pacing = if args.no_pacing {
        None
    } else {
        let min_ms = args
            .pacing_min_ms
            .or_else(|| file_config.and_then(|cfg| cfg.pacing_min_ms));
        let max_ms = args
            .pacing_max_ms
            .or_else(|| file_config.and_then(|cfg| cfg.pacing_max_ms));
        let min = min_ms.map_or(DEFAULT_PACING_MIN, Duration::from_millis);
        let max = max_ms.map_or(DEFAULT_PACING_MAX, Duration::from_millis);
        if min > max {
            bail!(
                "Invalid effective pacing range: {}ms..{}ms. The minimum must not exceed the maximum",
                min.as_millis(),
                max.as_millis()
            );
        }
        if max.is_zero() { None } else { Some((min, max)) }
    };

    Ok(DownloadSettings {
        discovery,
        output_dir,
        format,
        concurrency,
        max_retries,
        pacing,
    })
}

pub(crate) fn resolve_default_log_level(
    verbose: u8,
    quiet: bool,
    file_verbosity: Option<VerbositySetting>,
) -> &'static str {
    if quiet {
        return "error";
    }
    if verbose == 0
        && let Some(verbosity) = file_verbosity
    {
        return match verbosity {
            VerbositySetting::Default => "info",
            VerbositySetting::Verbose => "debug",
            VerbositySetting::Quiet => "error",
            VerbositySetting::Debug => "trace",
        };
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Whether output should be reduced to errors and final results.
pub(crate) fn is_quiet(quiet: bool, verbose: u8, file_verbosity: Option<VerbositySetting>) -> bool {
    quiet || (verbose == 0 && file_verbosity == Some(VerbositySetting::Quiet))
}

/// CLI verbosity flags always beat `RUST_LOG`; otherwise the environment wins.
pub(crate) fn should_force_cli_log_level(verbose: u8, quiet: bool) -> bool {
    verbose > 0 || quiet
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn download_args() -> DownloadArgs {
        DownloadArgs {
            url: "https://a.test/".to_string(),
            render: false,
            format: None,
            output_dir: None,
            pick: None,
            concurrency: None,
            max_retries: None,
            pacing_min_ms: None,
            pacing_max_ms: None,
            no_pacing: false,
            json: false,
        }
    }

    #[test]
    fn test_defaults_without_cli_or_file() {
        let settings = resolve_download_settings(&download_args(), None).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert_eq!(settings.format, TargetFormat::Jpg);
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(settings.pacing, Some((DEFAULT_PACING_MIN, DEFAULT_PACING_MAX)));
        assert_eq!(settings.discovery.mode, DiscoveryMode::Static);
        assert_eq!(
            settings.discovery.fetch_timeout,
            Duration::from_secs(FETCH_TIMEOUT_SECS)
        );
        assert_eq!(
            settings.discovery.render.max_scroll_iterations,
            DEFAULT_MAX_SCROLL_ITERATIONS
        );
    }

    #[test]
    fn test_file_config_overrides_defaults() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("pictures")),
            format: Some(TargetFormat::Png),
            concurrency: Some(2),
            render: Some(true),
            probe_timeout_secs: Some(9),
            max_scroll_iterations: Some(5),
            ..FileConfig::default()
        };
        let settings = resolve_download_settings(&download_args(), Some(&file)).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("pictures"));
        assert_eq!(settings.format, TargetFormat::Png);
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.discovery.mode, DiscoveryMode::Rendered);
        assert_eq!(settings.discovery.probe_timeout, Duration::from_secs(9));
        assert_eq!(settings.discovery.render.max_scroll_iterations, 5);
    }

    #[test]
    fn test_cli_overrides_file_config() {
        let file = FileConfig {
            format: Some(TargetFormat::Png),
            concurrency: Some(2),
            max_retries: Some(7),
            ..FileConfig::default()
        };
        let mut args = download_args();
        args.format = Some(TargetFormat::Jpg);
        args.concurrency = Some(12);
        args.max_retries = Some(1);
        let settings = resolve_download_settings(&args, Some(&file)).unwrap();
        assert_eq!(settings.format, TargetFormat::Jpg);
        assert_eq!(settings.concurrency, 12);
        assert_eq!(settings.max_retries, 1);
    }

    #[test]
    fn test_pacing_merges_bounds_across_sources() {
        let file = FileConfig {
            pacing_min_ms: Some(100),
            ..FileConfig::default()
        };
        let mut args = download_args();
        args.pacing_max_ms = Some(200);
        let settings = resolve_download_settings(&args, Some(&file)).unwrap();
        assert_eq!(
            settings.pacing,
            Some((Duration::from_millis(100), Duration::from_millis(200)))
        );
    }

    #[test]
    fn test_reversed_effective_pacing_is_rejected() {
        let mut args = download_args();
        args.pacing_min_ms = Some(5000);
        let err = resolve_download_settings(&args, None).unwrap_err();
        assert!(err.to_string().contains("pacing"));
    }

    #[test]
    fn test_no_pacing_and_zero_bounds_disable_pacing() {
        let mut args = download_args();
        args.no_pacing = true;
        assert_eq!(resolve_download_settings(&args, None).unwrap().pacing, None);

        let mut args = download_args();
        args.pacing_min_ms = Some(0);
        args.pacing_max_ms = Some(0);
        assert_eq!(resolve_download_settings(&args, None).unwrap().pacing, None);
    }

    #[test]
    fn test_log_level_priority() {
        assert_eq!(resolve_default_log_level(0, true, None), "error");
        assert_eq!(resolve_default_log_level(2, false, None), "trace");
        assert_eq!(
            resolve_default_log_level(0, false, Some(VerbositySetting::Verbose)),
            "debug"
        );
        assert_eq!(
            resolve_default_log_level(1, false, Some(VerbositySetting::Quiet)),
            "debug"
        );
        assert_eq!(resolve_default_log_level(0, false, None), "info");
    }

    #[test]
    fn test_quiet_from_file_only_without_cli_verbosity() {
        assert!(is_quiet(false, 0, Some(VerbositySetting::Quiet)));
        assert!(!is_quiet(false, 1, Some(VerbositySetting::Quiet)));
        assert!(is_quiet(true, 0, None));
        assert!(should_force_cli_log_level(1, false));
        assert!(!should_force_cli_log_level(0, false));
    }
}
