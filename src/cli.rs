//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use image_downloader_core::TargetFormat;

/// Discover, select and download the images referenced by a web page.
///
/// `discover` lists the candidate images of a page; `download` saves a
/// selection of them, normalized to a single raster format.
#[derive(Parser, Debug)]
#[command(name = "image-downloader")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the candidate images found on a page
    Discover(DiscoverArgs),
    /// Discover images on a page and download a selection of them
    Download(DownloadArgs),
}

/// Arguments for `discover`.
#[derive(Args, Debug, Clone)]
pub struct DiscoverArgs {
    /// Target page (https:// is assumed when no scheme is given)
    pub url: String,

    /// Load the page in a headless browser and scroll it before extracting
    #[arg(long)]
    pub render: bool,

    /// Print candidates as a JSON array
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `download`.
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Target page (https:// is assumed when no scheme is given)
    pub url: String,

    /// Load the page in a headless browser and scroll it before extracting
    #[arg(long)]
    pub render: bool,

    /// Output raster format (jpg or png); SVG images are kept as SVG
    #[arg(short = 'f', long)]
    pub format: Option<TargetFormat>,

    /// Destination directory (created if missing)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// 1-based candidate numbers to download, e.g. `1,3,5` or `2-4` (default: all)
    #[arg(short = 'p', long)]
    pub pick: Option<String>,

    /// Maximum concurrent downloads (1-16)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Attempts per image for transient failures, including the first (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    /// Lower bound of the random delay before each request, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub pacing_min_ms: Option<u64>,

    /// Upper bound of the random delay before each request, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub pacing_max_ms: Option<u64>,

    /// Disable the random delay between requests
    #[arg(long, conflicts_with_all = ["pacing_min_ms", "pacing_max_ms"])]
    pub no_pacing: bool,

    /// Print the batch summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn download_args(argv: &[&str]) -> DownloadArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Download(args) => args,
            Command::Discover(_) => panic!("expected download subcommand"),
        }
    }

    #[test]
    fn test_cli_discover_parses_url_and_flags() {
        let cli = Cli::try_parse_from(["image-downloader", "discover", "example.com", "--render"])
            .unwrap();
        let Command::Discover(args) = cli.command else {
            panic!("expected discover subcommand");
        };
        assert_eq!(args.url, "example.com");
        assert!(args.render);
        assert!(!args.json);
    }

    #[test]
    fn test_cli_download_defaults_are_unset() {
        let args = download_args(&["image-downloader", "download", "https://a.test/"]);
        assert!(args.format.is_none());
        assert!(args.output_dir.is_none());
        assert!(args.pick.is_none());
        assert!(args.concurrency.is_none());
        assert!(args.max_retries.is_none());
        assert!(!args.no_pacing);
    }

    #[test]
    fn test_cli_download_parses_all_options() {
        let args = download_args(&[
            "image-downloader",
            "download",
            "https://a.test/",
            "--format",
            "png",
            "-o",
            "out",
            "--pick",
            "1,3",
            "-c",
            "8",
            "-r",
            "5",
            "--pacing-min-ms",
            "10",
            "--pacing-max-ms",
            "20",
            "--json",
        ]);
        assert_eq!(args.format, Some(TargetFormat::Png));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
        assert_eq!(args.pick.as_deref(), Some("1,3"));
        assert_eq!(args.concurrency, Some(8));
        assert_eq!(args.max_retries, Some(5));
        assert_eq!(args.pacing_min_ms, Some(10));
        assert_eq!(args.pacing_max_ms, Some(20));
        assert!(args.json);
    }

    #[test]
    fn test_cli_concurrency_range_is_enforced() {
        for value in ["0", "17"] {
            let result = Cli::try_parse_from([
                "image-downloader",
                "download",
                "https://a.test/",
                "-c",
                value,
            ]);
            assert!(result.is_err(), "concurrency {value} should be rejected");
        }
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        let result = Cli::try_parse_from([
            "image-downloader",
            "download",
            "https://a.test/",
            "--format",
            "tiff",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_no_pacing_conflicts_with_bounds() {
        let result = Cli::try_parse_from([
            "image-downloader",
            "download",
            "https://a.test/",
            "--no-pacing",
            "--pacing-min-ms",
            "5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_global_verbosity_flags() {
        let cli = Cli::try_parse_from(["image-downloader", "-vv", "discover", "a.test"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["image-downloader", "discover", "a.test", "-q"]).unwrap();
        assert!(cli.quiet);

        let result = Cli::try_parse_from(["image-downloader", "-q", "-v", "discover", "a.test"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["image-downloader"]).is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["image-downloader", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
