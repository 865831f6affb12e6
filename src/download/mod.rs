//! Bundle transfer plumbing: HTTP transport, local loads, and the version cache.
//!
//! This module provides everything below the request queue: the
//! [`Transport`] seam with its [`TransferRequest`]/[`TransferHandle`] types,
//! the reqwest-backed [`HttpTransport`], the disk-backed [`FileLoader`], and
//! the [`VersionCache`] port the host implements.
//!
//! # Features
//!
//! - Streaming transfers into memory with live byte counters
//! - Optional CRC32 verification of received bytes
//! - Per-request timeout and redirect-limit overrides
//! - Hash-validated requests served from and stored into the version cache
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use bundle_downloader::download::{HttpTransport, TransferRequest, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new()?;
//! let handle = transport.start(&TransferRequest::new(
//!     "https://cdn.example.com/ui.bundle".parse()?,
//! ));
//! let outcome = handle.completed().await;
//! println!("finished: {}", outcome.is_some());
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod constants;
mod error;
mod integrity;
mod local;
mod transport;

pub use cache::{MemoryVersionCache, VersionCache};
pub use client::{HttpTransport, TransportError};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_REDIRECT_LIMIT,
    READ_TIMEOUT_SECS,
};
pub use error::DownloadError;
pub use integrity::verify_crc;
pub use local::{FileLoader, LocalLoad, LocalLoader, is_local_path};
pub use transport::{
    CachedBundle, CertificateHandler, TransferHandle, TransferId, TransferOutcome,
    TransferRequest, Transport,
};

// No module-local Result alias; signatures spell out `Result<T, DownloadError>`.
