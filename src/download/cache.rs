//! Bundle version cache port and an in-memory implementation.
//!
//! The host owns caching policy. This crate only asks whether a bundle
//! version is cached, clears a version after a failed transfer, and (through
//! [`HttpTransport`](super::HttpTransport)) reads and fills cache entries.
//! Eviction is out of scope.

use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use super::CachedBundle;

/// Host-owned cache of downloaded bundle versions.
pub trait VersionCache: Send + Sync {
    /// Returns true if `bundle` is present in the cache.
    fn is_version_cached(&self, bundle: &CachedBundle) -> bool;

    /// Removes `bundle` from the cache. Removing a missing entry is a no-op.
    fn clear_cached_version(&self, bundle: &CachedBundle);

    /// Returns the cached bytes for `bundle`, if readable.
    fn load(&self, bundle: &CachedBundle) -> Option<Bytes>;

    /// Stores freshly downloaded bytes for `bundle`.
    fn store(&self, bundle: &CachedBundle, bytes: Bytes);
}

/// Thread-safe in-memory [`VersionCache`].
#[derive(Debug, Default)]
pub struct MemoryVersionCache {
    entries: DashMap<CachedBundle, Bytes>,
}

impl MemoryVersionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VersionCache for MemoryVersionCache {
    fn is_version_cached(&self, bundle: &CachedBundle) -> bool {
        self.entries.contains_key(bundle)
    }

    fn clear_cached_version(&self, bundle: &CachedBundle) {
        if self.entries.remove(bundle).is_some() {
            debug!(bundle = %bundle.name, hash = %bundle.hash, "cleared cached bundle version");
        }
    }

    fn load(&self, bundle: &CachedBundle) -> Option<Bytes> {
        self.entries.get(bundle).map(|entry| entry.value().clone())
    }

    fn store(&self, bundle: &CachedBundle, bytes: Bytes) {
        debug!(bundle = %bundle.name, hash = %bundle.hash, bytes = bytes.len(), "caching bundle version");
        self.entries.insert(bundle.clone(), bytes);
    }
}
