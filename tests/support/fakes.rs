//! Test doubles built on the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bundle_downloader::download::{
    MemoryVersionCache, TransferHandle, TransferRequest, Transport, VersionCache,
};
use bundle_downloader::session::{BundleEvent, BundleHost, HostCompletion};
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;

/// Summary of one host completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub success: bool,
    pub bundle: Option<Bytes>,
    pub error: Option<String>,
}

/// Host that forwards completions to a channel and shares one version cache.
#[derive(Debug)]
pub struct ChannelHost {
    cache: Arc<MemoryVersionCache>,
    tx: tokio::sync::mpsc::UnboundedSender<Completion>,
}

impl ChannelHost {
    pub fn new(cache: Arc<MemoryVersionCache>) -> (Arc<Self>, UnboundedReceiver<Completion>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Arc::new(Self { cache, tx }), rx)
    }
}

impl BundleHost for ChannelHost {
    fn complete(&self, completion: HostCompletion) {
        let bundle = completion.resource.as_ref().and_then(|s| s.bundle());
        let _ = self.tx.send(Completion {
            success: completion.success,
            bundle,
            error: completion.error.map(|e| e.to_string()),
        });
    }

    fn version_cache(&self) -> Option<Arc<dyn VersionCache>> {
        Some(Arc::clone(&self.cache) as Arc<dyn VersionCache>)
    }
}

/// Waits for the next item, failing the test after five seconds.
pub async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel item")
        .expect("channel closed")
}

/// Collects events until (and including) the first one of `kind`.
pub async fn events_until(rx: &mut UnboundedReceiver<BundleEvent>, kind: &str) -> Vec<BundleEvent> {
    let mut events = Vec::new();
    loop {
        let event = next(rx).await;
        let done = event.kind() == kind;
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Transport that finishes every transfer after a fixed delay and records
/// start order and peak concurrency.
#[derive(Debug, Default)]
pub struct DelayTransport {
    delay: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    started: Mutex<Vec<String>>,
}

impl DelayTransport {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl Transport for DelayTransport {
    fn start(&self, request: &TransferRequest) -> TransferHandle {
        let handle = TransferHandle::new(request.url.clone());
        self.started.lock().unwrap().push(request.url.path().to_string());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let active = Arc::clone(&self.active);
        let delay = self.delay;
        let task_handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            active.fetch_sub(1, Ordering::SeqCst);
            task_handle.finish(Ok(Bytes::from_static(b"bundle")));
        });
        handle
    }
}

/// Transport that holds the first `held` transfers until [`finish`](Self::finish)
/// and hands back every later one already finished.
#[derive(Debug, Default)]
pub struct InstantTransport {
    held: usize,
    handles: Mutex<Vec<TransferHandle>>,
}

impl InstantTransport {
    pub fn new(held: usize) -> Arc<Self> {
        Arc::new(Self {
            held,
            ..Self::default()
        })
    }

    pub fn finish(&self, index: usize) {
        let handle = self.handles.lock().unwrap()[index].clone();
        handle.finish(Ok(Bytes::from_static(b"bundle")));
    }

    pub fn started_count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

impl Transport for InstantTransport {
    fn start(&self, request: &TransferRequest) -> TransferHandle {
        let handle = TransferHandle::new(request.url.clone());
        let index = {
            let mut handles = self.handles.lock().unwrap();
            handles.push(handle.clone());
            handles.len() - 1
        };
        if index >= self.held {
            handle.finish(Ok(Bytes::from_static(b"bundle")));
        }
        handle
    }
}
