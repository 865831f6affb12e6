//! Transfer requests, handles, and the [`Transport`] seam the request queue starts.
//!
//! A [`Transport`] turns a [`TransferRequest`] into a running transfer and
//! hands back a [`TransferHandle`]. The handle exposes live byte counters for
//! progress polling and a completion [`Promise`] that resolves exactly once
//! with the [`TransferOutcome`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use url::Url;

use super::DownloadError;
use crate::promise::Promise;

/// Result of one finished transfer: the received bytes, or the transport error.
pub type TransferOutcome = Result<Bytes, Arc<DownloadError>>;

static NEXT_TRANSFER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one started transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    fn next() -> Self {
        Self(NEXT_TRANSFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transfer-{}", self.0)
    }
}

/// Key of one bundle version in the host's version cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CachedBundle {
    /// Bundle name.
    pub name: String,
    /// Version hash (opaque to this crate).
    pub hash: String,
}

impl CachedBundle {
    /// Creates a cache key.
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }
}

/// Host-supplied certificate validation hook attached to outgoing transfers.
///
/// The handler contributes extra trusted roots; the transport keeps its own
/// default trust store alongside them.
pub trait CertificateHandler: fmt::Debug + Send + Sync {
    /// PEM-encoded root certificates to trust for this transfer.
    fn root_certificates_pem(&self) -> Vec<Vec<u8>>;
}

/// A fully built network request for one bundle.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Remote location of the bundle.
    pub url: Url,
    /// Cache key when the request is hash-validated.
    pub cached_bundle: Option<CachedBundle>,
    /// CRC32 the received bytes must match, when verification is wanted.
    pub crc: Option<u32>,
    /// Whole-transfer timeout override.
    pub timeout: Option<Duration>,
    /// Redirect limit override.
    pub redirect_limit: Option<usize>,
    /// Optional certificate handler.
    pub certificate_handler: Option<Arc<dyn CertificateHandler>>,
}

impl TransferRequest {
    /// Creates a plain request with no validation or overrides.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            cached_bundle: None,
            crc: None,
            timeout: None,
            redirect_limit: None,
            certificate_handler: None,
        }
    }
}

#[derive(Debug, Default)]
struct ByteCounters {
    downloaded: AtomicU64,
    content_length: AtomicU64,
}

/// Handle to one started transfer.
///
/// Cloning yields another handle to the same transfer. Transports report
/// progress through [`record_bytes`](Self::record_bytes) and finish the
/// transfer with [`finish`](Self::finish).
#[derive(Debug, Clone)]
pub struct TransferHandle {
    id: TransferId,
    url: Url,
    counters: Arc<ByteCounters>,
    completion: Promise<TransferOutcome>,
}

impl TransferHandle {
    /// Creates a handle for a transfer of `url` that has just started.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            id: TransferId::next(),
            url,
            counters: Arc::new(ByteCounters::default()),
            completion: Promise::new(),
        }
    }

    /// Returns the transfer id.
    #[must_use]
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Returns the transferred URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Records the expected body length once the response headers arrive.
    pub fn set_content_length(&self, bytes: u64) {
        self.counters.content_length.store(bytes, Ordering::SeqCst);
    }

    /// Adds `bytes` to the received-byte counter.
    pub fn record_bytes(&self, bytes: u64) {
        self.counters.downloaded.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Bytes received so far.
    #[must_use]
    pub fn downloaded_bytes(&self) -> u64 {
        self.counters.downloaded.load(Ordering::SeqCst)
    }

    /// Expected body length, or 0 when unknown.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.counters.content_length.load(Ordering::SeqCst)
    }

    /// Returns true once the transfer finished (successfully or not).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.completion.is_resolved()
    }

    /// Fraction of the transfer completed, in `0.0..=1.0`.
    ///
    /// A finished transfer always reports 1.0; an unfinished one with an
    /// unknown length reports 0.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f32 {
        if self.is_done() {
            return 1.0;
        }
        let total = self.content_length();
        if total == 0 {
            return 0.0;
        }
        let fraction = self.downloaded_bytes() as f64 / total as f64;
        // Stay below 1.0 until the outcome is actually in.
        fraction.min(0.999) as f32
    }

    /// Returns the outcome if the transfer has finished.
    #[must_use]
    pub fn outcome(&self) -> Option<TransferOutcome> {
        self.completion.value()
    }

    /// Registers `observer` to run once with the outcome.
    ///
    /// Observers run in registration order; an observer registered after the
    /// transfer finished runs immediately.
    pub fn on_complete<F>(&self, observer: F)
    where
        F: FnOnce(TransferOutcome) + Send + 'static,
    {
        self.completion.on_resolved(observer);
    }

    /// Waits for the outcome without blocking the runtime.
    ///
    /// Returns `None` if every clone of the handle was dropped before the
    /// transfer finished.
    pub async fn completed(&self) -> Option<TransferOutcome> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.on_complete(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.ok()
    }

    /// Finishes the transfer. Later calls are ignored.
    pub fn finish(&self, outcome: TransferOutcome) {
        if self.completion.resolve(outcome).is_err() {
            tracing::warn!(transfer = %self.id, "transfer finished twice; ignoring second outcome");
        }
    }
}

/// Mechanism that actually moves bundle bytes.
///
/// `start` must return promptly; the transfer itself runs elsewhere and
/// reports through the returned handle. Implementations must not call back
/// into the request queue from inside `start`.
pub trait Transport: Send + Sync {
    /// Starts `request` and returns its handle.
    fn start(&self, request: &TransferRequest) -> TransferHandle;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn handle() -> TransferHandle {
        TransferHandle::new(Url::parse("https://cdn.example.com/a.bundle").unwrap())
    }

    #[test]
    fn test_transfer_ids_are_unique() {
        let a = handle();
        let b = handle();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_progress_unknown_length_is_zero_until_done() {
        let h = handle();
        h.record_bytes(512);
        assert!(h.progress().abs() < f32::EPSILON);
        h.finish(Ok(Bytes::from_static(b"x")));
        assert!((h.progress() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_progress_tracks_content_length_below_one() {
        let h = handle();
        h.set_content_length(200);
        h.record_bytes(50);
        assert!((h.progress() - 0.25).abs() < 1e-6);
        h.record_bytes(150);
        assert!(h.progress() < 1.0, "unfinished transfer must stay below 1.0");
    }

    #[test]
    fn test_finish_twice_keeps_first_outcome() {
        let h = handle();
        h.finish(Ok(Bytes::from_static(b"first")));
        h.finish(Err(Arc::new(DownloadError::timeout("https://cdn.example.com"))));
        assert_eq!(h.outcome().unwrap().unwrap(), Bytes::from_static(b"first"));
    }

    #[test]
    fn test_completed_resolves_with_outcome() {
        let h = handle();
        let waiter = h.clone();
        h.finish(Ok(Bytes::from_static(b"done")));
        let outcome = tokio_test::block_on(waiter.completed());
        assert_eq!(outcome.unwrap().unwrap(), Bytes::from_static(b"done"));
    }

    #[test]
    fn test_clone_shares_counters_and_completion() {
        let h = handle();
        let other = h.clone();
        other.record_bytes(10);
        assert_eq!(h.downloaded_bytes(), 10);
        other.finish(Ok(Bytes::new()));
        assert!(h.is_done());
    }
}
