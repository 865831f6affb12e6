//! Local bundle loading.
//!
//! Bundles that already sit on disk skip the request queue entirely. A
//! [`LocalLoader`] reads them asynchronously and resolves a [`LocalLoad`] with
//! the bytes, or with `None` when the file cannot be read or fails its CRC.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::DownloadError;
use super::client::TransportError;
use super::integrity::verify_crc;
use crate::promise::Promise;

/// Returns true if `path` should be loaded from disk rather than the network.
///
/// That is the case for existing regular files, and on Android for paths
/// inside the application package (`jar:` URLs).
#[must_use]
pub fn is_local_path(path: &str) -> bool {
    Path::new(path).is_file() || (cfg!(target_os = "android") && path.starts_with("jar:"))
}

/// One in-flight or finished local load.
#[derive(Debug, Clone)]
pub struct LocalLoad {
    path: PathBuf,
    completion: Promise<Option<Bytes>>,
}

impl LocalLoad {
    /// Creates an unfinished load of `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            completion: Promise::new(),
        }
    }

    /// Path being loaded.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the load finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.completion.is_resolved()
    }

    /// 0.0 while loading, 1.0 once finished.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.is_done() { 1.0 } else { 0.0 }
    }

    /// Registers `observer` to run once with the loaded bytes (or `None`).
    pub fn on_complete<F>(&self, observer: F)
    where
        F: FnOnce(Option<Bytes>) + Send + 'static,
    {
        self.completion.on_resolved(observer);
    }

    /// Finishes the load. Later calls are ignored.
    pub fn finish(&self, bundle: Option<Bytes>) {
        if self.completion.resolve(bundle).is_err() {
            warn!(path = %self.path.display(), "local load finished twice; ignoring");
        }
    }
}

/// Reads bundles from local storage.
pub trait LocalLoader: Send + Sync {
    /// Starts loading `path`, verifying `crc` when given.
    fn load(&self, path: &Path, crc: Option<u32>) -> LocalLoad;
}

/// [`LocalLoader`] backed by `tokio::fs`.
#[derive(Debug, Clone)]
pub struct FileLoader {
    runtime: Handle,
}

impl FileLoader {
    /// Creates a loader on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NoRuntime`] outside a Tokio runtime.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            runtime: Handle::try_current()?,
        })
    }
}

impl LocalLoader for FileLoader {
    fn load(&self, path: &Path, crc: Option<u32>) -> LocalLoad {
        let load = LocalLoad::new(path);
        let task_load = load.clone();
        let path = path.to_path_buf();

        self.runtime.spawn(async move {
            match read_bundle(&path, crc).await {
                Ok(bytes) => {
                    debug!(path = %path.display(), bytes = bytes.len(), "local bundle loaded");
                    task_load.finish(Some(bytes));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "local bundle load failed");
                    task_load.finish(None);
                }
            }
        });

        load
    }
}

async fn read_bundle(path: &Path, crc: Option<u32>) -> Result<Bytes, DownloadError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    verify_crc(crc, &path.display().to_string(), &raw)?;
    Ok(Bytes::from(raw))
}
