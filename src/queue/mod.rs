//! Admission control for network transfers.
//!
//! This module provides the [`RequestQueue`], which bounds how many bundle
//! transfers run at once. Requests beyond the cap wait in strict FIFO order
//! and are started one by one as running transfers finish.
//!
//! # Overview
//!
//! - [`RequestQueue`] - the admission gate (one per process, injected where needed)
//! - [`TransferTicket`] - single-resolution handle for an admitted or queued transfer
//! - [`QueueError`] - configuration errors
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bundle_downloader::download::{HttpTransport, TransferRequest};
//! use bundle_downloader::queue::RequestQueue;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = RequestQueue::new(Arc::new(HttpTransport::new()?));
//! queue.set_max_concurrent_requests(4)?;
//!
//! let ticket = queue.enqueue(TransferRequest::new("https://cdn.example.com/ui.bundle".parse()?));
//! ticket.on_complete(|handle| {
//!     handle.on_complete(|outcome| println!("ok: {}", outcome.is_ok()));
//! });
//! # Ok(())
//! # }
//! ```

mod error;
mod ticket;

pub use error::QueueError;
pub use ticket::TransferTicket;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, instrument};

use crate::download::{
    DEFAULT_MAX_CONCURRENT_REQUESTS, TransferHandle, TransferId, TransferRequest, Transport,
};

struct QueueState {
    max_concurrent: usize,
    active: HashMap<TransferId, TransferHandle>,
    pending: VecDeque<TransferTicket>,
    /// Started transfers whose tickets are not resolved yet, in admission order.
    ready: VecDeque<(TransferTicket, TransferHandle)>,
    /// Set while one caller is resolving `ready`.
    resolving: bool,
}

/// Concurrency-bounded, FIFO admission gate for network transfers.
///
/// # Concurrency Model
///
/// - At most `max_concurrent_requests` transfers are active at any instant
/// - Overflow tickets wait in arrival order; none is dropped or reordered
/// - Each finished transfer frees its own slot and admits the next waiter
/// - Tickets resolve in admission order, even when a transfer finishes
///   before its ticket resolves or completions race on different threads
/// - State sits behind a mutex that is never held while observers run, so
///   ticket observers may enqueue again from inside their callback
pub struct RequestQueue {
    transport: Arc<dyn Transport>,
    state: Mutex<QueueState>,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RequestQueue")
            .field("max_concurrent", &state.max_concurrent)
            .field("active", &state.active.len())
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

impl RequestQueue {
    /// Creates a queue starting transfers on `transport`, capped at
    /// [`DEFAULT_MAX_CONCURRENT_REQUESTS`].
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            state: Mutex::new(QueueState {
                max_concurrent: DEFAULT_MAX_CONCURRENT_REQUESTS,
                active: HashMap::new(),
                pending: VecDeque::new(),
                ready: VecDeque::new(),
                resolving: false,
            }),
        })
    }

    /// Creates a queue with an explicit concurrency cap.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConcurrency`] if `max_concurrent` is 0.
    pub fn with_max_concurrent_requests(
        transport: Arc<dyn Transport>,
        max_concurrent: usize,
    ) -> Result<Arc<Self>, QueueError> {
        let queue = Self::new(transport);
        queue.set_max_concurrent_requests(max_concurrent)?;
        Ok(queue)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the concurrency cap used for future admission decisions.
    ///
    /// Transfers that are already running are unaffected; lowering the cap
    /// delays further admissions until enough of them finish. Raising it
    /// takes effect at the next completion, which admits waiting tickets up
    /// to the new cap.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConcurrency`] if `max_concurrent` is 0.
    #[instrument(level = "debug", skip(self))]
    pub fn set_max_concurrent_requests(&self, max_concurrent: usize) -> Result<(), QueueError> {
        if max_concurrent < 1 {
            return Err(QueueError::InvalidConcurrency {
                value: max_concurrent,
            });
        }
        self.lock().max_concurrent = max_concurrent;
        Ok(())
    }

    /// Returns the current concurrency cap.
    #[must_use]
    pub fn max_concurrent_requests(&self) -> usize {
        self.lock().max_concurrent
    }

    /// Number of transfers currently running.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Number of tickets waiting for a slot.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Submits `request` for transfer.
    ///
    /// With a free slot and nobody waiting, the transfer starts at once and
    /// the returned ticket is normally already resolved. It resolves later
    /// only when earlier admitted tickets are still being resolved, from an
    /// enclosing observer or another thread. Otherwise the ticket joins the
    /// back of the pending queue and resolves when it is admitted.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub fn enqueue(self: &Arc<Self>, request: TransferRequest) -> TransferTicket {
        let ticket = TransferTicket::new(request);

        let admitted = {
            let mut state = self.lock();
            if state.pending.is_empty() && state.active.len() < state.max_concurrent {
                let handle = self.transport.start(ticket.request());
                state.active.insert(handle.id(), handle.clone());
                debug!(
                    transfer = %handle.id(),
                    active = state.active.len(),
                    max = state.max_concurrent,
                    "transfer admitted immediately"
                );
                state.ready.push_back((ticket.clone(), handle));
                true
            } else {
                state.pending.push_back(ticket.clone());
                debug!(
                    pending = state.pending.len(),
                    max = state.max_concurrent,
                    "transfer queued"
                );
                false
            }
        };

        if admitted {
            self.resolve_admitted();
        }

        ticket
    }

    /// Hooks the queue's completion handling onto a newly started transfer.
    fn watch(self: &Arc<Self>, handle: &TransferHandle) {
        let queue: Weak<Self> = Arc::downgrade(self);
        let id = handle.id();
        handle.on_complete(move |_| {
            if let Some(queue) = queue.upgrade() {
                queue.on_transfer_complete(id);
            }
        });
    }

    /// Frees the finished transfer's slot and admits waiting tickets in order.
    fn on_transfer_complete(self: &Arc<Self>, id: TransferId) {
        {
            let mut state = self.lock();
            state.active.remove(&id);

            let mut admitted = 0;
            while state.active.len() < state.max_concurrent {
                let Some(ticket) = state.pending.pop_front() else {
                    break;
                };
                let handle = self.transport.start(ticket.request());
                state.active.insert(handle.id(), handle.clone());
                state.ready.push_back((ticket, handle));
                admitted += 1;
            }

            debug!(
                finished = %id,
                admitted,
                active = state.active.len(),
                pending = state.pending.len(),
                "transfer finished"
            );
        }

        self.resolve_admitted();
    }

    /// Resolves admitted tickets one at a time in admission order.
    ///
    /// Only one caller drains at a time. A nested or concurrent call made
    /// while another caller is draining returns at once; the draining caller
    /// picks up whatever it queued.
    fn resolve_admitted(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.resolving {
                return;
            }
            state.resolving = true;
        }

        loop {
            let next = {
                let mut state = self.lock();
                let next = state.ready.pop_front();
                if next.is_none() {
                    state.resolving = false;
                }
                next
            };
            let Some((ticket, handle)) = next else {
                return;
            };
            self.watch(&handle);
            ticket.complete(handle);
        }
    }
}
