//! Constants for the download module (timeouts, admission limits).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large bundles).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default redirect limit when a request does not override it.
pub const DEFAULT_REDIRECT_LIMIT: usize = 10;

/// Default cap on simultaneously admitted network transfers.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
