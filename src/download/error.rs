//! Error types for the download module.
//!
//! This module defines structured errors for bundle transfers and local loads,
//! providing context-rich error messages for debugging and host reporting.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while acquiring a bundle's bytes.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, redirect loops, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while loading a local bundle.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The network locator could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The resolved path is neither an existing local file nor a network locator.
    #[error("invalid path in bundle provider: '{path}'")]
    InvalidPath {
        /// The resolved path.
        path: String,
    },

    /// Bundle bytes did not match the expected CRC32.
    #[error("CRC mismatch for {source_name}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// URL or path the bytes came from.
        source_name: String,
        /// CRC declared in the request options.
        expected: u32,
        /// CRC computed over the received bytes.
        actual: u32,
    },

    /// A cached bundle version was reported present but could not be read.
    #[error("cached bundle {bundle_name} ({hash}) could not be read")]
    CacheRead {
        /// Bundle name used as the cache key.
        bundle_name: String,
        /// Version hash used as the cache key.
        hash: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Creates a CRC mismatch error.
    pub fn crc_mismatch(source_name: impl Into<String>, expected: u32, actual: u32) -> Self {
        Self::CrcMismatch {
            source_name: source_name.into(),
            expected,
            actual,
        }
    }

    /// Creates a cache read error.
    pub fn cache_read(bundle_name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self::CacheRead {
            bundle_name: bundle_name.into(),
            hash: hash.into(),
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path, which the source errors don't carry.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://cdn.example.com/ui.bundle");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://cdn.example.com/ui.bundle"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://cdn.example.com/ui.bundle", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(
            msg.contains("https://cdn.example.com/ui.bundle"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = DownloadError::io(PathBuf::from("/bundles/ui.bundle"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/bundles/ui.bundle"), "Expected path in: {msg}");
    }

    #[test]
    fn test_download_error_invalid_path_display() {
        let error = DownloadError::invalid_path("not/a/real/bundle");
        let msg = error.to_string();
        assert!(msg.contains("invalid path"), "Expected 'invalid path' in: {msg}");
        assert!(msg.contains("'not/a/real/bundle'"), "Expected quoted path in: {msg}");
    }

    #[test]
    fn test_download_error_crc_mismatch_display_is_hex() {
        let error = DownloadError::crc_mismatch("ui.bundle", 0xDEAD_BEEF, 0x1234);
        let msg = error.to_string();
        assert!(msg.contains("0xdeadbeef"), "Expected hex CRC in: {msg}");
        assert!(msg.contains("0x00001234"), "Expected padded hex CRC in: {msg}");
    }

    #[test]
    fn test_download_error_cache_read_display() {
        let error = DownloadError::cache_read("ui", "abc123");
        let msg = error.to_string();
        assert!(msg.contains("ui"));
        assert!(msg.contains("abc123"));
    }
}
