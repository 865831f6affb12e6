//! Transfer tickets handed out by the request queue.

use std::sync::Arc;

use tracing::warn;

use crate::download::{TransferHandle, TransferRequest};
use crate::promise::Promise;

/// One admitted or queued network transfer.
///
/// The ticket's result slot is set exactly once, with the handle of the
/// started transfer. Tickets resolve in the order they were admitted. A
/// ticket admitted on the fast path is normally already resolved when
/// [`RequestQueue::enqueue`](super::RequestQueue::enqueue) returns it; a
/// queued ticket resolves later, when a slot frees up.
#[derive(Debug, Clone)]
pub struct TransferTicket {
    request: Arc<TransferRequest>,
    result: Promise<TransferHandle>,
}

impl TransferTicket {
    pub(super) fn new(request: TransferRequest) -> Self {
        Self {
            request: Arc::new(request),
            result: Promise::new(),
        }
    }

    /// The request this ticket will start.
    #[must_use]
    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    /// Returns true once the transfer has been started.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.result.is_resolved()
    }

    /// The started transfer, if admitted.
    #[must_use]
    pub fn result(&self) -> Option<TransferHandle> {
        self.result.value()
    }

    /// Registers `observer` to run with the transfer handle once admitted.
    ///
    /// Runs immediately if the ticket was already admitted.
    pub fn on_complete<F>(&self, observer: F)
    where
        F: FnOnce(TransferHandle) + Send + 'static,
    {
        self.result.on_resolved(observer);
    }

    pub(super) fn complete(&self, handle: TransferHandle) {
        if self.result.resolve(handle).is_err() {
            warn!(url = %self.request.url, "ticket admitted twice; ignoring");
        }
    }
}
