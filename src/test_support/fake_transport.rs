use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::download::{DownloadError, TransferHandle, TransferRequest, Transport};

/// Transport whose transfers only finish when a test says so.
#[derive(Debug, Default)]
pub struct ManualTransport {
    started: Mutex<Vec<(TransferRequest, TransferHandle)>>,
    /// When set, transfers after the first `n` succeed inside `start`.
    held: Option<usize>,
}

impl ManualTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Holds the first `held` transfers; every later one is already finished
    /// when `start` returns it.
    pub fn finishing_after(held: usize) -> Arc<Self> {
        Arc::new(Self {
            held: Some(held),
            ..Self::default()
        })
    }

    pub fn started_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn handle(&self, index: usize) -> TransferHandle {
        self.started.lock().unwrap()[index].1.clone()
    }

    pub fn request(&self, index: usize) -> TransferRequest {
        self.started.lock().unwrap()[index].0.clone()
    }

    pub fn unfinished(&self) -> usize {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, handle)| !handle.is_done())
            .count()
    }

    pub fn succeed(&self, index: usize, body: &'static [u8]) {
        let handle = self.handle(index);
        handle.record_bytes(body.len() as u64);
        handle.finish(Ok(Bytes::from_static(body)));
    }

    pub fn fail(&self, index: usize) {
        let handle = self.handle(index);
        let url = handle.url().to_string();
        handle.finish(Err(Arc::new(DownloadError::http_status(url, 503))));
    }
}

impl Transport for ManualTransport {
    fn start(&self, request: &TransferRequest) -> TransferHandle {
        let handle = TransferHandle::new(request.url.clone());
        let index = {
            let mut started = self.started.lock().unwrap();
            started.push((request.clone(), handle.clone()));
            started.len() - 1
        };
        if self.held.is_some_and(|held| index >= held) {
            handle.finish(Ok(Bytes::from_static(b"instant")));
        }
        handle
    }
}
