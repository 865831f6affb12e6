//! Per-bundle download sessions.
//!
//! A [`BundleSession`] drives one requested bundle from start to a final
//! host completion. Each attempt either loads the bundle from local storage
//! or submits a transfer to the shared [`RequestQueue`]. Failed transfers are
//! retried automatically up to the retry ceiling from the request options;
//! after that the session escalates with a [`BundleEvent::Failure`] and
//! waits for the event receiver to choose through [`FailureResolution`].
//!
//! # Locking
//!
//! Session state sits behind one mutex. It is never held while calling the
//! host, the event sink, the queue, or the local loader, so all of them may
//! call back into the session (for example, retry from inside a `Failure`
//! handler).

mod events;
mod host;
mod options;
mod progress;
mod provider;
mod state;

pub use events::{
    BundleEvent, BundleEventSink, ChannelEventSink, FailureResolution, NoopEventSink, SessionInfo,
};
pub use host::{BundleHost, HostCompletion};
pub use options::{BundleLocation, BundleRequestOptions};
pub use progress::{DownloadStatus, ProgressProbe};
pub use provider::BundleProvider;
pub use state::SessionPhase;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::download::{
    DownloadError, LocalLoader, TransferHandle, TransferOutcome, is_local_path,
};
use crate::queue::RequestQueue;
use state::SessionState;

struct SessionInner {
    host: Arc<dyn BundleHost>,
    queue: Arc<RequestQueue>,
    loader: Arc<dyn LocalLoader>,
    events: Arc<dyn BundleEventSink>,
    state: Mutex<SessionState>,
}

/// Download state machine for one bundle.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct BundleSession {
    inner: Arc<SessionInner>,
}

/// What a failed transfer leads to.
enum FailureStep {
    Retry { attempt: u32, max: u32 },
    Escalate,
}

impl BundleSession {
    /// Creates an idle session.
    #[must_use]
    pub fn new(
        host: Arc<dyn BundleHost>,
        queue: Arc<RequestQueue>,
        loader: Arc<dyn LocalLoader>,
        events: Arc<dyn BundleEventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                host,
                queue,
                loader,
                events,
                state: Mutex::new(SessionState::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: BundleEvent) {
        debug!(event = event.kind(), internal_id = %event.info().internal_id, "bundle event");
        self.inner.events.emit(event);
    }

    /// Starts loading `location`.
    ///
    /// Resets retry state, computes the expected byte total, registers
    /// progress accessors with the host and begins the first attempt.
    #[instrument(skip(self, location), fields(internal_id = %location.internal_id))]
    pub fn start(&self, location: BundleLocation) {
        let cache = self.inner.host.version_cache();
        let bytes_to_download = location
            .options
            .as_ref()
            .map_or(0, |options| options.compute_size(cache.as_deref()));

        self.lock().reset(location, bytes_to_download);
        debug!(bytes_to_download, "session started");

        self.inner
            .host
            .register_progress(ProgressProbe::new(Arc::downgrade(&self.inner)));
        self.begin_operation();
    }

    /// Runs one attempt: local load, network transfer, or invalid path.
    fn begin_operation(&self) {
        let (location, info, generation) = {
            let mut state = self.lock();
            let Some(location) = state.location.clone() else {
                warn!("attempt requested before start; ignoring");
                return;
            };
            state.generation += 1;
            state.phase = SessionPhase::Starting;
            state.clear_inflight();
            (location, state.info.clone(), state.generation)
        };

        self.emit(BundleEvent::Start(info.clone()));

        let path = self.inner.host.transform_internal_id(&location);
        let crc = location.options.as_ref().and_then(BundleRequestOptions::crc);

        if is_local_path(&path) {
            debug!(path = %path, "loading bundle from local storage");
            let load = self.inner.loader.load(Path::new(&path), crc);
            {
                let mut state = self.lock();
                if state.generation != generation {
                    return;
                }
                state.phase = SessionPhase::LocalLoading;
                state.local_load = Some(load.clone());
            }
            let session = self.clone();
            load.on_complete(move |bundle| session.on_local_complete(generation, bundle));
        } else if self.inner.host.should_use_network(&path) {
            let request = match location.transfer_request(
                &path,
                self.inner.host.version_cache().as_deref(),
                self.inner.host.certificate_handler(),
            ) {
                Ok(request) => request,
                Err(e) => {
                    warn!(path = %path, error = %e, "malformed bundle locator");
                    self.emit(BundleEvent::MalformedLocator(info));
                    return;
                }
            };

            let ticket = self.inner.queue.enqueue(request);
            {
                let mut state = self.lock();
                if state.generation != generation {
                    return;
                }
                state.phase = SessionPhase::QueuedForNetwork;
                state.ticket = Some(ticket.clone());
            }
            let session = self.clone();
            ticket.on_complete(move |handle| session.on_transfer_admitted(generation, handle));
        } else {
            warn!(path = %path, "bundle path is neither local nor a network locator");
            self.lock().phase = SessionPhase::PermanentlyFailed;
            self.notify_host(false, false, Some(DownloadError::invalid_path(path)));
        }
    }

    fn on_local_complete(&self, generation: u64, bundle: Option<Bytes>) {
        let success = bundle.is_some();
        {
            let mut state = self.lock();
            if state.generation != generation {
                debug!("ignoring stale local load");
                return;
            }
            state.bundle = bundle;
            state.phase = if success {
                SessionPhase::Succeeded
            } else {
                SessionPhase::PermanentlyFailed
            };
        }
        self.notify_host(true, success, None);
    }

    fn on_transfer_admitted(&self, generation: u64, handle: TransferHandle) {
        {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(transfer = %handle.id(), "ignoring transfer admitted for a stale attempt");
                return;
            }
            state.phase = SessionPhase::NetworkLoading;
            state.transfer = Some(handle.clone());
        }
        debug!(transfer = %handle.id(), "transfer admitted");
        let session = self.clone();
        handle.on_complete(move |outcome| session.on_transfer_complete(generation, outcome));
    }

    fn on_transfer_complete(&self, generation: u64, outcome: TransferOutcome) {
        let info = {
            let state = self.lock();
            if state.generation != generation {
                debug!("ignoring stale transfer completion");
                return;
            }
            state.info.clone()
        };

        self.emit(BundleEvent::Complete(info.clone()));

        match outcome {
            Ok(bytes) => {
                {
                    let mut state = self.lock();
                    if state.generation != generation {
                        return;
                    }
                    info!(bytes = bytes.len(), "bundle downloaded");
                    state.downloaded = Some(bytes);
                    state.phase = SessionPhase::Succeeded;
                }
                self.notify_host(true, true, None);
                self.emit(BundleEvent::Success(info));
            }
            Err(error) => self.on_transfer_failed(generation, &error, info),
        }
    }

    fn on_transfer_failed(&self, generation: u64, error: &DownloadError, info: SessionInfo) {
        warn!(error = %error, "bundle transfer failed");

        let cached_bundle = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.downloaded = None;
            state.transfer = None;
            state.ticket = None;
            state
                .location
                .as_ref()
                .and_then(|l| l.options.as_ref())
                .and_then(BundleRequestOptions::cached_bundle)
        };

        let cleared_cached_version = match (cached_bundle, self.inner.host.version_cache()) {
            (Some(key), Some(cache)) if cache.is_version_cached(&key) => {
                info!(bundle = %key.name, hash = %key.hash, "clearing cached version after failed transfer");
                cache.clear_cached_version(&key);
                true
            }
            _ => false,
        };

        let step = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            let max = state.retry_ceiling();
            if cleared_cached_version && max == 0 && state.retries == 0 && !state.cache_recovery_used
            {
                state.cache_recovery_used = true;
                state.retries += 1;
                state.phase = SessionPhase::RetryPending;
                None
            } else if state.retries < max {
                let attempt = state.retries;
                state.retries += 1;
                state.phase = SessionPhase::RetryPending;
                Some(FailureStep::Retry { attempt, max })
            } else {
                state.phase = SessionPhase::FailureEscalated;
                Some(FailureStep::Escalate)
            }
        };

        match step {
            None => {
                info!("retrying once after clearing the cached version");
                self.begin_operation();
            }
            Some(FailureStep::Retry { attempt, max }) => {
                info!(attempt, max, "retrying bundle transfer");
                self.emit(BundleEvent::Retry { info, attempt, max });
                self.begin_operation();
            }
            Some(FailureStep::Escalate) => {
                warn!("automatic retries exhausted; escalating failure");
                let resolution = FailureResolution::new(self.clone(), generation);
                self.emit(BundleEvent::Failure { info, resolution });
            }
        }
    }

    /// Leaves `FailureEscalated` for `next` if the resolution is still current.
    fn resolve_escalation(&self, generation: u64, next: SessionPhase) -> bool {
        let mut state = self.lock();
        if state.generation != generation || state.phase != SessionPhase::FailureEscalated {
            warn!(phase = %state.phase, "stale failure resolution; ignoring");
            return false;
        }
        state.phase = next;
        state.retries = 0;
        true
    }

    fn retry_after_failure(&self, generation: u64) {
        if self.resolve_escalation(generation, SessionPhase::RetryPending) {
            info!("retrying bundle transfer on request");
            self.begin_operation();
        }
    }

    fn give_up_after_failure(&self, generation: u64) {
        if self.resolve_escalation(generation, SessionPhase::PermanentlyFailed) {
            info!("giving up on bundle");
            self.notify_host(false, false, None);
        }
    }

    /// Reports the final result to the host, at most once per start.
    fn notify_host(&self, with_resource: bool, success: bool, error: Option<DownloadError>) {
        {
            let mut state = self.lock();
            if state.host_notified {
                warn!(success, "host completion already reported; suppressing");
                return;
            }
            state.host_notified = true;
        }
        self.inner.host.complete(HostCompletion {
            resource: with_resource.then(|| self.clone()),
            success,
            error,
        });
    }

    /// Releases the bundle and every transfer reference. Safe to call twice.
    #[instrument(skip(self), fields(internal_id = %self.info().internal_id))]
    pub fn unload(&self) {
        let info = {
            let mut state = self.lock();
            state.generation += 1;
            state.bundle = None;
            state.downloaded = None;
            state.clear_inflight();
            state.phase = SessionPhase::Unloaded;
            state.info.clone()
        };
        debug!("bundle unloaded");
        self.emit(BundleEvent::Unload(info));
    }

    /// The loaded bundle bytes, if any.
    ///
    /// The first call after a network download moves the downloaded buffer
    /// into the bundle slot.
    #[must_use]
    pub fn bundle(&self) -> Option<Bytes> {
        let mut state = self.lock();
        if state.bundle.is_none() {
            state.bundle = state.downloaded.take();
        }
        state.bundle.clone()
    }

    /// Progress of the current attempt in `0.0..=1.0`; 0.0 with nothing in flight.
    #[must_use]
    pub fn percent_complete(&self) -> f32 {
        self.lock().percent_complete()
    }

    /// Byte-level status; downloaded bytes snap to the total once progress
    /// reaches 1.0.
    #[must_use]
    pub fn download_status(&self) -> DownloadStatus {
        let state = self.lock();
        if !state.has_options() {
            return DownloadStatus::default();
        }

        let percent = state.percent_complete();
        let total_bytes = state.bytes_to_download;
        let mut status = DownloadStatus {
            total_bytes,
            downloaded_bytes: 0,
            is_done: percent >= 1.0,
        };
        if total_bytes == 0 {
            return status;
        }

        if percent >= 1.0 {
            status.downloaded_bytes = total_bytes;
        } else if let Some(transfer) = &state.transfer {
            status.downloaded_bytes = transfer.downloaded_bytes().min(total_bytes);
        }
        status
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    /// Returns true if both handles refer to the same session.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity carried by this session's events.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        self.lock().info.clone()
    }

    /// Automatic retries made in the current round.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.lock().retries
    }
}

impl std::fmt::Debug for BundleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BundleSession")
            .field("internal_id", &state.info.internal_id)
            .field("phase", &state.phase)
            .field("retries", &state.retries)
            .finish_non_exhaustive()
    }
}
