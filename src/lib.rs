//! Bundle Downloader Core Library
//!
//! This library downloads packaged asset bundles over HTTP or from local
//! storage on behalf of an embedding asset loader (the "host"), with a
//! global cap on concurrent network transfers, automatic retries, progress
//! reporting and lifecycle events.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`promise`] - Single-assignment cell with observers
//! - [`download`] - Transfer types, HTTP transport, local loader, version cache
//! - [`queue`] - Concurrency-bounded FIFO request queue
//! - [`session`] - Per-bundle download state machine, host port and events

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod promise;
pub mod queue;
pub mod session;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_support;
mod user_agent;

// Re-export commonly used types
pub use download::{
    DEFAULT_MAX_CONCURRENT_REQUESTS, DownloadError, FileLoader, HttpTransport, MemoryVersionCache,
    TransferRequest, Transport, VersionCache,
};
pub use promise::Promise;
pub use queue::{QueueError, RequestQueue, TransferTicket};
pub use session::{
    BundleEvent, BundleEventSink, BundleHost, BundleLocation, BundleProvider,
    BundleRequestOptions, BundleSession, ChannelEventSink, DownloadStatus, FailureResolution,
    HostCompletion, SessionPhase,
};
