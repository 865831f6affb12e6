//! HTTP transport for bundle transfers.
//!
//! This module provides [`HttpTransport`], the production [`Transport`]. Each
//! started transfer runs on its own Tokio task, streams the response body
//! into memory while updating the handle's byte counters, verifies the CRC
//! when requested, and fills the host's version cache on success.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client, ClientBuilder};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use super::cache::VersionCache;
use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_REDIRECT_LIMIT, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::integrity::verify_crc;
use super::transport::{TransferHandle, TransferRequest, Transport};
use crate::user_agent;

/// Errors raised while constructing an [`HttpTransport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No Tokio runtime was running on the constructing thread.
    #[error("no Tokio runtime available to drive transfers: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP transport that streams bundles into memory.
///
/// Create it once inside a Tokio runtime and share it; transfers are spawned
/// on that runtime even when `start` is called from another thread.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use bundle_downloader::download::{HttpTransport, TransferRequest, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new()?;
/// let request = TransferRequest::new("https://cdn.example.com/ui.bundle".parse()?);
/// let handle = transport.start(&request);
/// if let Some(Ok(bytes)) = handle.completed().await {
///     println!("received {} bytes", bytes.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    runtime: Handle,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    cache: Option<Arc<dyn VersionCache>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("has_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport with default timeouts on the current Tokio runtime.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes
    /// - Redirect limit: 10
    /// - Gzip decompression: enabled
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoRuntime`] outside a Tokio runtime and
    /// [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let runtime = Handle::try_current()?;
        let client = base_client_builder(connect_timeout_secs, read_timeout_secs).build()?;
        Ok(Self {
            client,
            runtime,
            connect_timeout_secs,
            read_timeout_secs,
            cache: None,
        })
    }

    /// Serves hash-validated requests from `cache` and stores fresh downloads in it.
    #[must_use]
    pub fn with_version_cache(mut self, cache: Arc<dyn VersionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns the shared client, or a dedicated one when the request overrides
    /// redirect handling or trusted roots.
    fn client_for(&self, request: &TransferRequest) -> Result<Client, DownloadError> {
        if request.redirect_limit.is_none() && request.certificate_handler.is_none() {
            return Ok(self.client.clone());
        }

        let mut builder = base_client_builder(self.connect_timeout_secs, self.read_timeout_secs)
            .redirect(Policy::limited(
                request.redirect_limit.unwrap_or(DEFAULT_REDIRECT_LIMIT),
            ));
        if let Some(handler) = &request.certificate_handler {
            for pem in handler.root_certificates_pem() {
                match Certificate::from_pem(&pem) {
                    Ok(cert) => builder = builder.add_root_certificate(cert),
                    Err(e) => warn!(error = %e, "ignoring unparsable root certificate"),
                }
            }
        }
        builder
            .build()
            .map_err(|e| DownloadError::network(request.url.as_str(), e))
    }

    /// Runs one transfer to completion, reporting progress through `handle`.
    #[instrument(skip(self, request, handle), fields(url = %request.url, transfer = %handle.id()))]
    async fn fetch(
        &self,
        request: &TransferRequest,
        handle: &TransferHandle,
    ) -> Result<Bytes, DownloadError> {
        let url = request.url.as_str();

        if let (Some(cache), Some(key)) = (&self.cache, &request.cached_bundle)
            && cache.is_version_cached(key)
        {
            let bytes = cache
                .load(key)
                .ok_or_else(|| DownloadError::cache_read(&key.name, &key.hash))?;
            let len = bytes.len() as u64;
            handle.set_content_length(len);
            handle.record_bytes(len);
            verify_crc(request.crc, url, &bytes)?;
            debug!(bundle = %key.name, hash = %key.hash, bytes = len, "served bundle from cache");
            return Ok(bytes);
        }

        let client = self.client_for(request)?;
        let mut builder = client.get(request.url.clone());
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(url, e))?;
        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }
        if let Some(len) = response.content_length() {
            handle.set_content_length(len);
        }

        let bytes = stream_to_buffer(response, url, handle).await?;
        verify_crc(request.crc, url, &bytes)?;

        if let (Some(cache), Some(key)) = (&self.cache, &request.cached_bundle) {
            cache.store(key, bytes.clone());
        }

        info!(bytes = bytes.len(), "bundle transfer complete");
        Ok(bytes)
    }
}

impl Transport for HttpTransport {
    fn start(&self, request: &TransferRequest) -> TransferHandle {
        let handle = TransferHandle::new(request.url.clone());
        let transport = self.clone();
        let request = request.clone();
        let task_handle = handle.clone();

        self.runtime.spawn(async move {
            let outcome = transport.fetch(&request, &task_handle).await;
            if let Err(e) = &outcome {
                debug!(transfer = %task_handle.id(), error = %e, "bundle transfer failed");
            }
            task_handle.finish(outcome.map_err(Arc::new));
        });

        handle
    }
}

/// Streams the response body into memory, updating the handle's byte counter.
async fn stream_to_buffer(
    response: reqwest::Response,
    url: &str,
    handle: &TransferHandle,
) -> Result<Bytes, DownloadError> {
    let capacity = usize::try_from(handle.content_length()).unwrap_or(0);
    let mut buffer = Vec::with_capacity(capacity);
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| map_reqwest_error(url, e))?;
        buffer.extend_from_slice(&chunk);
        handle.record_bytes(chunk.len() as u64);
    }

    Ok(Bytes::from(buffer))
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

fn base_client_builder(connect_timeout_secs: u64, read_timeout_secs: u64) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .redirect(Policy::limited(DEFAULT_REDIRECT_LIMIT))
        .gzip(true)
        .user_agent(user_agent::default_download_user_agent())
}
