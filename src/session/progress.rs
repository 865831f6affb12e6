//! Progress reporting.

use std::sync::Weak;

use serde::Serialize;

use super::{BundleSession, SessionInner};

/// Byte-level download status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadStatus {
    /// Bytes expected for this session; 0 when unknown or already cached.
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub is_done: bool,
}

impl DownloadStatus {
    /// Downloaded fraction in `0.0..=1.0`, or 0.0 with an unknown total.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.downloaded_bytes as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Progress accessors handed to the host.
///
/// Holds the session weakly; a probe that outlives its session reports
/// zero progress.
#[derive(Clone)]
pub struct ProgressProbe {
    session: Weak<SessionInner>,
}

impl ProgressProbe {
    pub(super) fn new(session: Weak<SessionInner>) -> Self {
        Self { session }
    }

    fn session(&self) -> Option<BundleSession> {
        self.session.upgrade().map(|inner| BundleSession { inner })
    }

    #[must_use]
    pub fn percent_complete(&self) -> f32 {
        self.session()
            .map_or(0.0, |session| session.percent_complete())
    }

    #[must_use]
    pub fn download_status(&self) -> DownloadStatus {
        self.session()
            .map(|session| session.download_status())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ProgressProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressProbe")
            .field("alive", &(self.session.strong_count() > 0))
            .finish()
    }
}
