//! File configuration for CLI defaults.
//!
//! An optional `config.toml` holding flat `key = value` lines. Values from
//! the file sit between the built-in defaults and explicit command-line
//! flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

use crate::download::TargetFormat;

const APP_DIR: &str = "image-downloader";

/// File-backed defaults for the image downloader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default destination directory.
    pub output_dir: Option<PathBuf>,
    /// Default raster output format.
    pub format: Option<TargetFormat>,
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<u8>,
    /// Use the rendering engine for discovery by default.
    pub render: Option<bool>,
    /// Attempts per image, including the first.
    pub max_retries: Option<u32>,
    /// Lower bound of the pacing delay in milliseconds.
    pub pacing_min_ms: Option<u64>,
    /// Upper bound of the pacing delay in milliseconds.
    pub pacing_max_ms: Option<u64>,
    /// Page and image fetch timeout in seconds.
    pub fetch_timeout_secs: Option<u64>,
    /// Connectivity probe timeout in seconds.
    pub probe_timeout_secs: Option<u64>,
    /// Bound on scroll iterations in rendered discovery.
    pub max_scroll_iterations: Option<u32>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range key.
    pub fn validate(&self) -> Result<()> {
        validate_range("concurrency", self.concurrency.map(u64::from), 1, 16)?;
        validate_range("max_retries", self.max_retries.map(u64::from), 1, 10)?;
        validate_range("pacing_min_ms", self.pacing_min_ms, 0, 60_000)?;
        validate_range("pacing_max_ms", self.pacing_max_ms, 0, 60_000)?;
        validate_range("fetch_timeout_secs", self.fetch_timeout_secs, 1, 3600)?;
        validate_range("probe_timeout_secs", self.probe_timeout_secs, 1, 3600)?;
        validate_range(
            "max_scroll_iterations",
            self.max_scroll_iterations.map(u64::from),
            1,
            200,
        )?;

        if let (Some(min), Some(max)) = (self.pacing_min_ms, self.pacing_max_ms)
            && min > max
        {
            bail!("Invalid config: `pacing_min_ms` ({min}) is greater than `pacing_max_ms` ({max})");
        }
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    /// Info-level logs, progress bar.
    Default,
    /// Debug-level logs.
    Verbose,
    /// Errors only, no progress bar.
    Quiet,
    /// Trace-level logs.
    Debug,
}

impl VerbositySetting {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

impl LoadedConfig {
    /// Whether configuration was loaded from disk.
    #[must_use]
    pub fn loaded_from_file(&self) -> bool {
        self.config.is_some()
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/image-downloader/config.toml`
/// 2. `$HOME/.config/image-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or is invalid.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

/// Loads and validates the config file at `path`.
///
/// # Errors
///
/// Returns an error when the file cannot be read or is invalid.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "format" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.format = Some(
                    parsed
                        .parse::<TargetFormat>()
                        .map_err(|e| anyhow!(e))
                        .with_context(invalid)?,
                );
            }
            "concurrency" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                cfg.concurrency = Some(
                    u8::try_from(parsed)
                        .map_err(|_| anyhow!("Integer value out of range for u8"))
                        .with_context(invalid)?,
                );
            }
            "render" => cfg.render = Some(parse_boolean(value).with_context(invalid)?),
            "max_retries" => cfg.max_retries = Some(parse_u32(value).with_context(invalid)?),
            "pacing_min_ms" => {
                cfg.pacing_min_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "pacing_max_ms" => {
                cfg.pacing_max_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "fetch_timeout_secs" => {
                cfg.fetch_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "probe_timeout_secs" => {
                cfg.probe_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "max_scroll_iterations" => {
                cfg.max_scroll_iterations = Some(parse_u32(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow!("Integer value out of range for u64"))
}

fn parse_u32(raw_value: &str) -> Result<u32> {
    let value = parse_integer_u64(raw_value)?;
    u32::try_from(value).map_err(|_| anyhow!("Integer value out of range for u32"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
concurrency = 8
format = "png"
verbosity = "verbose"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.concurrency, Some(8));
        assert_eq!(cfg.format, Some(TargetFormat::Png));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
        assert!(cfg.output_dir.is_none());
        assert!(cfg.render.is_none());
    }

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
output_dir = "/tmp/pictures"
format = "jpg"
concurrency = 2
render = true
max_retries = 5
pacing_min_ms = 100
pacing_max_ms = 300
fetch_timeout_secs = 20
probe_timeout_secs = 3
max_scroll_iterations = 40
verbosity = "quiet"
"#,
        )
        .expect("full config should parse");
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/tmp/pictures")));
        assert_eq!(cfg.render, Some(true));
        assert_eq!(cfg.max_retries, Some(5));
        assert_eq!(cfg.pacing_min_ms, Some(100));
        assert_eq!(cfg.pacing_max_ms, Some(300));
        assert_eq!(cfg.fetch_timeout_secs, Some(20));
        assert_eq!(cfg.probe_timeout_secs, Some(3));
        assert_eq!(cfg.max_scroll_iterations, Some(40));
    }

    #[test]
    fn test_parse_config_rejects_invalid_concurrency() {
        let err = parse_config_str("concurrency = 17").expect_err("invalid concurrency expected");
        assert!(err.to_string().contains("concurrency"));
        let err = parse_config_str("concurrency = 300").expect_err("u8 overflow expected");
        assert!(format!("{err:#}").contains("concurrency"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_format() {
        let err = parse_config_str(r#"format = "bmp""#).expect_err("bad format expected");
        assert!(err.to_string().contains("format"));
    }

    #[test]
    fn test_parse_config_rejects_reversed_pacing() {
        let err = parse_config_str("pacing_min_ms = 900\npacing_max_ms = 100")
            .expect_err("reversed pacing expected");
        assert!(err.to_string().contains("pacing_min_ms"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("concurrency = 4 trailing")
            .expect_err("expected trailing token error");
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
concurrency = 4 # workers
output_dir = "imgs#1" # hash inside quotes survives
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.concurrency, Some(4));
        assert_eq!(cfg.output_dir, Some(PathBuf::from("imgs#1")));
    }

    #[test]
    fn test_parse_config_rejects_invalid_boolean() {
        let err = parse_config_str("render = yes").expect_err("invalid boolean expected");
        assert!(err.to_string().contains("render"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout_value() {
        let err = parse_config_str("probe_timeout_secs = 0").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("probe_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("render true").expect_err("syntax error expected");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_file_config_reads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_retries = 2\n").unwrap();
        let cfg = load_file_config(&path).unwrap();
        assert_eq!(cfg.max_retries, Some(2));
    }

    #[test]
    fn test_verbosity_as_str() {
        assert_eq!(VerbositySetting::Default.as_str(), "default");
        assert_eq!(VerbositySetting::Quiet.as_str(), "quiet");
    }
}
