//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Download asset bundles with bounded concurrency and retries.
///
/// Each input is a bundle URL or a local file path. Local files are loaded
/// directly; URLs go through a shared request queue.
#[derive(Parser, Debug)]
#[command(name = "bundle-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Bundle URLs or local paths
    #[arg(value_name = "LOCATION")]
    pub locations: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent network transfers (1-100) [default: 10]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Automatic retries per bundle after a failed transfer (0-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Per-transfer timeout in seconds (0 keeps the client default)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(0..=3600))]
    pub timeout: Option<u64>,

    /// Maximum redirects to follow (0 keeps the client default)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=50))]
    pub redirect_limit: Option<u32>,

    /// Expected CRC32 of every bundle, in hex (e.g. 0x1a2b3c4d)
    #[arg(long, value_parser = parse_crc)]
    pub crc: Option<u32>,

    /// Expected version hash; enables the version cache for these bundles
    #[arg(long)]
    pub hash: Option<String>,

    /// Verify the CRC even when the hashed version is already cached
    #[arg(long)]
    pub crc_for_cached: bool,

    /// Bundle name used as the cache key (defaults to the file name)
    #[arg(short = 'n', long)]
    pub bundle_name: Option<String>,

    /// Directory downloaded bundles are written to
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Start one more round of retries when a bundle exhausts its retries
    #[arg(long)]
    pub retry_on_failure: bool,
}

fn parse_crc(raw: &str) -> Result<u32, String> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid CRC32 '{raw}': {e}"))
}
