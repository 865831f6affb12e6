//! Host implementation the CLI hands to each bundle session.

use std::sync::{Arc, Mutex, PoisonError};

use bundle_downloader::download::{MemoryVersionCache, VersionCache};
use bundle_downloader::session::{
    BundleHost, DownloadStatus, HostCompletion, ProgressProbe,
};
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Final result of one bundle, as seen by the run loop.
#[derive(Debug)]
pub(crate) struct Finished {
    pub(crate) index: usize,
    pub(crate) success: bool,
    pub(crate) error: Option<String>,
    pub(crate) bundle: Option<Bytes>,
}

/// Progress probes of every session in the run.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProbeBoard {
    probes: Arc<Mutex<Vec<ProgressProbe>>>,
}

impl ProbeBoard {
    fn push(&self, probe: ProgressProbe) {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(probe);
    }

    /// Sums the byte-level status of every registered session.
    pub(crate) fn totals(&self) -> DownloadStatus {
        let probes = self
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        probes
            .iter()
            .map(ProgressProbe::download_status)
            .fold(DownloadStatus::default(), |acc, status| DownloadStatus {
                total_bytes: acc.total_bytes + status.total_bytes,
                downloaded_bytes: acc.downloaded_bytes + status.downloaded_bytes,
                is_done: false,
            })
    }
}

/// One session's host: shares the run's version cache and reports
/// completions to the run loop.
#[derive(Debug)]
pub(crate) struct CliHost {
    index: usize,
    cache: Arc<MemoryVersionCache>,
    finished: UnboundedSender<Finished>,
    board: ProbeBoard,
}

impl CliHost {
    pub(crate) fn new(
        index: usize,
        cache: Arc<MemoryVersionCache>,
        finished: UnboundedSender<Finished>,
        board: ProbeBoard,
    ) -> Self {
        Self {
            index,
            cache,
            finished,
            board,
        }
    }
}

impl BundleHost for CliHost {
    fn register_progress(&self, probe: ProgressProbe) {
        self.board.push(probe);
    }

    fn complete(&self, completion: HostCompletion) {
        let bundle = completion.resource.as_ref().and_then(|session| session.bundle());
        let finished = Finished {
            index: self.index,
            success: completion.success,
            error: completion.error.map(|e| e.to_string()),
            bundle,
        };
        if self.finished.send(finished).is_err() {
            debug!(index = self.index, "run loop already gone; dropping completion");
        }
    }

    fn version_cache(&self) -> Option<Arc<dyn VersionCache>> {
        Some(Arc::clone(&self.cache) as Arc<dyn VersionCache>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_complete_forwards_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = CliHost::new(
            3,
            Arc::new(MemoryVersionCache::new()),
            tx,
            ProbeBoard::default(),
        );
        host.complete(HostCompletion {
            resource: None,
            success: false,
            error: None,
        });

        let finished = rx.try_recv().unwrap();
        assert_eq!(finished.index, 3);
        assert!(!finished.success);
        assert!(finished.bundle.is_none());
    }

    #[test]
    fn test_empty_board_totals_are_zero() {
        assert_eq!(ProbeBoard::default().totals(), DownloadStatus::default());
    }
}
