//! The host the session is embedded in.

use std::sync::Arc;

use super::{BundleLocation, BundleSession, ProgressProbe};
use crate::download::{CertificateHandler, DownloadError, VersionCache};

/// Final result a session reports to its host.
#[derive(Debug)]
pub struct HostCompletion {
    /// The session that produced the result; `None` after giving up or on an
    /// invalid path.
    pub resource: Option<BundleSession>,
    pub success: bool,
    pub error: Option<DownloadError>,
}

/// Services the embedding asset loader provides to a [`BundleSession`].
///
/// Every method is called without a session lock held.
pub trait BundleHost: Send + Sync {
    /// Maps a location to the concrete path or URL to load.
    fn transform_internal_id(&self, location: &BundleLocation) -> String {
        location.internal_id.clone()
    }

    /// Returns true if `path` should go through the network transport.
    fn should_use_network(&self, path: &str) -> bool {
        path.contains("://")
    }

    /// Receives progress accessors once per session start.
    fn register_progress(&self, _probe: ProgressProbe) {}

    /// Receives the session's final result. Called at most once per start.
    fn complete(&self, completion: HostCompletion);

    /// Version cache used for hash-validated requests.
    fn version_cache(&self) -> Option<Arc<dyn VersionCache>> {
        None
    }

    /// Certificate handler attached to outgoing transfers.
    fn certificate_handler(&self) -> Option<Arc<dyn CertificateHandler>> {
        None
    }
}
