//! Entry point wiring sessions to a shared queue, loader and event sink.

use std::sync::Arc;

use super::{BundleEventSink, BundleHost, BundleLocation, BundleSession};
use crate::download::LocalLoader;
use crate::queue::{QueueError, RequestQueue};

/// Creates and releases [`BundleSession`]s that share one request queue.
#[derive(Clone)]
pub struct BundleProvider {
    queue: Arc<RequestQueue>,
    loader: Arc<dyn LocalLoader>,
    events: Arc<dyn BundleEventSink>,
}

impl BundleProvider {
    #[must_use]
    pub fn new(
        queue: Arc<RequestQueue>,
        loader: Arc<dyn LocalLoader>,
        events: Arc<dyn BundleEventSink>,
    ) -> Self {
        Self {
            queue,
            loader,
            events,
        }
    }

    /// Creates a session for `location` and starts it.
    pub fn provide(&self, host: Arc<dyn BundleHost>, location: BundleLocation) -> BundleSession {
        let session = BundleSession::new(
            host,
            Arc::clone(&self.queue),
            Arc::clone(&self.loader),
            Arc::clone(&self.events),
        );
        session.start(location);
        session
    }

    /// Unloads a session previously returned by [`provide`](Self::provide).
    pub fn release(&self, session: &BundleSession) {
        session.unload();
    }

    /// Adjusts the shared queue's concurrency cap.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConcurrency`] if `max_concurrent` is 0.
    pub fn set_max_concurrent_requests(&self, max_concurrent: usize) -> Result<(), QueueError> {
        self.queue.set_max_concurrent_requests(max_concurrent)
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }
}

impl std::fmt::Debug for BundleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleProvider")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
