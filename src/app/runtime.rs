//! One CLI download run: start a session per location and drain results.

use std::collections::HashSet;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use bundle_downloader::download::{FileLoader, HttpTransport, MemoryVersionCache};
use bundle_downloader::session::{
    BundleEvent, BundleLocation, BundleProvider, BundleRequestOptions, ChannelEventSink,
};
use bundle_downloader::{RequestQueue, VersionCache};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::host::{CliHost, Finished, ProbeBoard};
use super::progress_manager;
use crate::app_config::Settings;
use crate::cli::Args;

/// Outcome counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
}

/// Downloads every location in `args` and writes the bundles to the output
/// directory.
pub(crate) async fn run_downloads(args: &Args, settings: &Settings) -> Result<RunSummary> {
    if args.locations.is_empty() {
        info!("No bundle locations given.");
        info!("Example: bundle-downloader https://cdn.example.com/ui.bundle");
        return Ok(RunSummary::default());
    }

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory '{}'",
                settings.output_dir.display()
            )
        })?;

    let cache = Arc::new(MemoryVersionCache::new());
    let transport =
        HttpTransport::with_timeouts(settings.connect_timeout_secs, settings.read_timeout_secs)
            .context("Failed to create HTTP transport")?
            .with_version_cache(Arc::clone(&cache) as Arc<dyn VersionCache>);
    let queue = RequestQueue::with_max_concurrent_requests(Arc::new(transport), settings.concurrency)?;
    let loader = FileLoader::new().context("Failed to create local bundle loader")?;
    let (sink, mut events) = ChannelEventSink::new();
    let provider = BundleProvider::new(Arc::clone(&queue), Arc::new(loader), Arc::new(sink));

    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel::<Finished>();
    let board = ProbeBoard::default();

    let sessions: Vec<_> = args
        .locations
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let host = Arc::new(CliHost::new(
                index,
                Arc::clone(&cache),
                finished_tx.clone(),
                board.clone(),
            ));
            provider.provide(host, bundle_location(raw, args, settings))
        })
        .collect();
    drop(finished_tx);

    let total = sessions.len();
    let done = Arc::new(AtomicUsize::new(0));
    let use_spinner = settings.log_level != "error" && io::stderr().is_terminal();
    let (ui, stop) = progress_manager::spawn_progress_ui(
        use_spinner,
        Arc::clone(&queue),
        board,
        Arc::clone(&done),
        total,
    );

    let mut summary = RunSummary::default();
    let mut manually_retried = HashSet::new();

    while done.load(Ordering::SeqCst) < total {
        tokio::select! {
            Some(finished) = finished_rx.recv() => {
                let location = &args.locations[finished.index];
                match (finished.success, finished.bundle) {
                    (true, Some(bundle)) => {
                        let target = settings.output_dir.join(output_file_name(location, finished.index));
                        tokio::fs::write(&target, &bundle)
                            .await
                            .with_context(|| format!("Failed to write '{}'", target.display()))?;
                        info!(location = %location, path = %target.display(), bytes = bundle.len(), "Bundle saved");
                        summary.succeeded += 1;
                    }
                    _ => {
                        warn!(location = %location, error = finished.error.as_deref().unwrap_or("gave up"), "Bundle failed");
                        summary.failed += 1;
                    }
                }
                done.fetch_add(1, Ordering::SeqCst);
            }
            Some(event) = events.recv() => match event {
                BundleEvent::MalformedLocator(info) => {
                    warn!(location = %info.internal_id, "Malformed bundle URL");
                    summary.failed += 1;
                    done.fetch_add(1, Ordering::SeqCst);
                }
                BundleEvent::Retry { info, attempt, max } => {
                    info!(location = %info.internal_id, retry = attempt + 1, max, "Retrying bundle");
                }
                BundleEvent::Failure { info, resolution } => {
                    let index = sessions
                        .iter()
                        .position(|session| session.ptr_eq(resolution.session()));
                    if settings.retry_on_failure
                        && index.is_some_and(|index| manually_retried.insert(index))
                    {
                        info!(location = %info.internal_id, "Retries exhausted; starting another round");
                        resolution.retry();
                    } else {
                        resolution.give_up();
                    }
                }
                other => debug!(
                    event = other.kind(),
                    session = %serde_json::to_string(other.info()).unwrap_or_default(),
                    "Bundle event"
                ),
            },
            else => break,
        }
    }

    stop.store(true, Ordering::SeqCst);
    if let Some(ui) = ui {
        let _ = ui.await;
    }
    for session in &sessions {
        provider.release(session);
    }

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        total,
        "Download complete"
    );
    Ok(summary)
}

fn bundle_location(raw: &str, args: &Args, settings: &Settings) -> BundleLocation {
    let bundle_name = args
        .bundle_name
        .clone()
        .unwrap_or_else(|| file_stem(raw).unwrap_or_else(|| raw.to_string()));

    let options = BundleRequestOptions {
        bundle_name,
        hash: args.hash.clone(),
        crc: args.crc.unwrap_or(0),
        use_crc_for_cached_bundle: args.crc_for_cached,
        timeout_secs: settings.timeout_secs,
        redirect_limit: settings.redirect_limit,
        retry_count: settings.max_retries,
        bundle_size: local_size(raw),
    };
    BundleLocation::new(raw).with_options(options)
}

fn last_segment(raw: &str) -> Option<String> {
    if let Ok(url) = Url::parse(raw)
        && url.has_host()
    {
        return url
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .map(|segment| {
                urlencoding::decode(&segment)
                    .map(std::borrow::Cow::into_owned)
                    .unwrap_or(segment)
            })
            .filter(|segment| !segment.is_empty());
    }
    Path::new(raw)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn file_stem(raw: &str) -> Option<String> {
    last_segment(raw).map(|name| {
        Path::new(&name)
            .file_stem()
            .map_or(name.clone(), |stem| stem.to_string_lossy().into_owned())
    })
}

fn output_file_name(raw: &str, index: usize) -> PathBuf {
    last_segment(raw)
        .filter(|name| !name.contains(['/', '\\']) && name != ".." && name != ".")
        .map_or_else(|| PathBuf::from(format!("bundle-{index}")), PathBuf::from)
}

/// Declared size of a local bundle; remote sizes are unknown up front.
fn local_size(raw: &str) -> u64 {
    std::fs::metadata(raw).map_or(0, |meta| if meta.is_file() { meta.len() } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["bundle-downloader"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_output_file_name_from_url() {
        assert_eq!(
            output_file_name("https://cdn.example.com/a/ui%20main.bundle?v=2", 0),
            PathBuf::from("ui main.bundle")
        );
    }

    #[test]
    fn test_output_file_name_falls_back_to_index() {
        assert_eq!(
            output_file_name("https://cdn.example.com/", 4),
            PathBuf::from("bundle-4")
        );
    }

    #[test]
    fn test_output_file_name_from_local_path() {
        assert_eq!(
            output_file_name("/data/bundles/ui.bundle", 0),
            PathBuf::from("ui.bundle")
        );
    }

    #[test]
    fn test_bundle_location_uses_settings_and_flags() {
        let args = args(&["--hash", "v1", "--crc", "ff", "-r", "2"]);
        let settings = Settings::resolve(&args, None);
        let location = bundle_location("https://cdn.example.com/ui.bundle", &args, &settings);
        let options = location.options.unwrap();
        assert_eq!(options.bundle_name, "ui");
        assert_eq!(options.hash.as_deref(), Some("v1"));
        assert_eq!(options.crc, 0xFF);
        assert_eq!(options.retry_count, 2);
        assert_eq!(options.bundle_size, 0);
    }

    #[test]
    fn test_explicit_bundle_name_wins() {
        let args = args(&["-n", "shared"]);
        let settings = Settings::resolve(&args, None);
        let location = bundle_location("https://cdn.example.com/ui.bundle", &args, &settings);
        assert_eq!(location.options.unwrap().bundle_name, "shared");
    }

    #[tokio::test]
    async fn test_run_without_locations_is_noop() {
        let args = args(&[]);
        let settings = Settings::resolve(&args, None);
        assert_eq!(
            run_downloads(&args, &settings).await.unwrap(),
            RunSummary::default()
        );
    }
}
