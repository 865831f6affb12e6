//! Per-bundle request options and transfer request construction.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::download::{CachedBundle, CertificateHandler, TransferRequest, VersionCache};

/// Options attached to one bundle location by the host.
///
/// Zero means "unset" for `crc`, `timeout_secs` and `redirect_limit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleRequestOptions {
    /// Bundle name, used as the version cache key together with `hash`.
    pub bundle_name: String,
    /// Expected version hash; empty or `None` disables hash validation.
    pub hash: Option<String>,
    /// Expected CRC32 of the bundle bytes.
    pub crc: u32,
    /// Verify the CRC even when the hashed version is already cached.
    pub use_crc_for_cached_bundle: bool,
    /// Whole-transfer timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum number of redirects to follow.
    pub redirect_limit: u32,
    /// Automatic retry ceiling for failed network transfers.
    pub retry_count: u32,
    /// Declared size of the bundle in bytes.
    pub bundle_size: u64,
}

impl BundleRequestOptions {
    /// Creates options for `bundle_name` with everything else unset.
    pub fn new(bundle_name: impl Into<String>) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            ..Self::default()
        }
    }

    /// Cache key for hash-validated requests.
    #[must_use]
    pub fn cached_bundle(&self) -> Option<CachedBundle> {
        self.hash
            .as_deref()
            .filter(|hash| !hash.is_empty())
            .map(|hash| CachedBundle::new(self.bundle_name.clone(), hash))
    }

    /// Expected CRC32, or `None` when unset.
    #[must_use]
    pub fn crc(&self) -> Option<u32> {
        (self.crc != 0).then_some(self.crc)
    }

    /// Bytes that still have to be downloaded.
    ///
    /// Returns 0 when the hashed version is already in `cache`, otherwise the
    /// declared bundle size.
    #[must_use]
    pub fn compute_size(&self, cache: Option<&dyn VersionCache>) -> u64 {
        match (self.cached_bundle(), cache) {
            (Some(key), Some(cache)) if cache.is_version_cached(&key) => 0,
            _ => self.bundle_size,
        }
    }

    /// Builds the network request for `url` under these options.
    ///
    /// A hash-validated request skips CRC verification when the version is
    /// already cached, unless `use_crc_for_cached_bundle` is set.
    pub(crate) fn transfer_request(
        &self,
        url: Url,
        cache: Option<&dyn VersionCache>,
        certificate_handler: Option<Arc<dyn CertificateHandler>>,
    ) -> TransferRequest {
        let mut request = TransferRequest::new(url);

        match self.cached_bundle() {
            Some(key) => {
                let cached = cache.is_some_and(|cache| cache.is_version_cached(&key));
                if self.use_crc_for_cached_bundle || !cached {
                    request.crc = self.crc();
                }
                request.cached_bundle = Some(key);
            }
            None => request.crc = self.crc(),
        }

        if self.timeout_secs > 0 {
            request.timeout = Some(Duration::from_secs(self.timeout_secs));
        }
        if self.redirect_limit > 0 {
            request.redirect_limit = Some(self.redirect_limit as usize);
        }
        request.certificate_handler = certificate_handler;
        request
    }
}

/// Where a bundle lives, as handed to a session at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLocation {
    /// Path or URL before host transformation.
    pub internal_id: String,
    /// Request options; `None` requests a plain, unvalidated transfer.
    pub options: Option<BundleRequestOptions>,
}

impl BundleLocation {
    /// Creates a location without options.
    pub fn new(internal_id: impl Into<String>) -> Self {
        Self {
            internal_id: internal_id.into(),
            options: None,
        }
    }

    /// Attaches request options.
    #[must_use]
    pub fn with_options(mut self, options: BundleRequestOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Builds the network request for the (already transformed) `path`.
    ///
    /// # Errors
    ///
    /// Returns the URL parse error when `path` is not a valid URL.
    pub(crate) fn transfer_request(
        &self,
        path: &str,
        cache: Option<&dyn VersionCache>,
        certificate_handler: Option<Arc<dyn CertificateHandler>>,
    ) -> Result<TransferRequest, url::ParseError> {
        let url = Url::parse(path)?;
        Ok(match &self.options {
            Some(options) => options.transfer_request(url, cache, certificate_handler),
            None => TransferRequest::new(url),
        })
    }
}
