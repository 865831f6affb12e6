//! File configuration for CLI defaults.
//!
//! The file is a `key = value` subset of TOML. Explicit flags always win over
//! file values, which win over built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bundle_downloader::download::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_REQUESTS, READ_TIMEOUT_SECS,
};

use crate::cli::Args;

/// Default automatic retries per bundle.
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// Parsed contents of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    /// Same range as `--concurrency`.
    pub concurrency: Option<u8>,
    /// Same range as `--max-retries`.
    pub max_retries: Option<u8>,
    pub timeout_secs: Option<u64>,
    pub redirect_limit: Option<u32>,
    pub retry_on_failure: Option<bool>,
    pub verbosity: Option<VerbositySetting>,
    pub download_connect_timeout_secs: Option<u64>,
    pub download_read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against the CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(max_retries) = self.max_retries
            && max_retries > 10
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 0..=10");
        }
        if let Some(timeout) = self.timeout_secs
            && timeout > 3600
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 0..=3600");
        }
        if let Some(limit) = self.redirect_limit
            && limit > 50
        {
            bail!("Invalid config value for `redirect_limit`: {limit}. Expected range: 0..=50");
        }
        validate_timeout_secs(
            "download_connect_timeout_secs",
            self.download_connect_timeout_secs,
        )?;
        validate_timeout_secs("download_read_timeout_secs", self.download_read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bundle-downloader/config.toml`
/// 2. `$HOME/.config/bundle-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bundle-downloader")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bundle-downloader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file from the default path, if one exists.
pub fn load_default_file_config() -> Result<Option<FileConfig>> {
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "max_retries" => {
                cfg.max_retries = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "timeout_secs" => {
                cfg.timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "redirect_limit" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                cfg.redirect_limit = Some(
                    u32::try_from(parsed)
                        .map_err(|_| anyhow::anyhow!("redirect_limit out of range for u32"))?,
                );
            }
            "retry_on_failure" => {
                cfg.retry_on_failure = Some(parse_boolean(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!(
                        "Invalid `verbosity` value '{}' on line {}",
                        parsed,
                        line_index + 1
                    )
                })?);
            }
            "download_connect_timeout_secs" => {
                cfg.download_connect_timeout_secs =
                    Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "download_read_timeout_secs" => {
                cfg.download_read_timeout_secs =
                    Some(parse_integer_u64(value).with_context(invalid)?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
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

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
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
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
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

/// Effective settings after merging flags, file config and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub redirect_limit: u32,
    pub retry_on_failure: bool,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Default tracing level when `RUST_LOG` is unset.
    pub log_level: &'static str,
}

impl Settings {
    #[must_use]
    pub fn resolve(args: &Args, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();

        // Priority: quiet flag > verbose flag > file verbosity > info
        let log_level = if args.quiet {
            "error"
        } else {
            match (args.verbose, file.verbosity) {
                (0, None | Some(VerbositySetting::Default)) => "info",
                (0, Some(VerbositySetting::Quiet)) => "error",
                (0, Some(VerbositySetting::Verbose)) | (1, _) => "debug",
                _ => "trace",
            }
        };

        Self {
            output_dir: args
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            concurrency: args
                .concurrency
                .or(file.concurrency)
                .map_or(DEFAULT_MAX_CONCURRENT_REQUESTS, usize::from),
            max_retries: u32::from(
                args.max_retries
                    .or(file.max_retries)
                    .unwrap_or(DEFAULT_MAX_RETRIES),
            ),
            timeout_secs: args.timeout.or(file.timeout_secs).unwrap_or(0),
            redirect_limit: args.redirect_limit.or(file.redirect_limit).unwrap_or(0),
            retry_on_failure: args.retry_on_failure || file.retry_on_failure.unwrap_or(false),
            connect_timeout_secs: file
                .download_connect_timeout_secs
                .unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.download_read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
            log_level,
        }
    }
}
