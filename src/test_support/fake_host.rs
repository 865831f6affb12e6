use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::download::{LocalLoad, LocalLoader, MemoryVersionCache, VersionCache};
use crate::session::{
    BundleEvent, BundleEventSink, BundleHost, FailureResolution, HostCompletion, ProgressProbe,
};

/// Summary of one host completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub has_resource: bool,
    pub success: bool,
    pub error: Option<String>,
}

/// Host that records every completion and progress registration.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub cache: Option<Arc<MemoryVersionCache>>,
    completions: Mutex<Vec<Completion>>,
    probes: Mutex<Vec<ProgressProbe>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_cache(cache: Arc<MemoryVersionCache>) -> Arc<Self> {
        Arc::new(Self {
            cache: Some(cache),
            ..Self::default()
        })
    }

    pub fn completions(&self) -> Vec<Completion> {
        self.completions.lock().unwrap().clone()
    }

    pub fn probe(&self) -> ProgressProbe {
        self.probes.lock().unwrap().last().unwrap().clone()
    }
}

impl BundleHost for RecordingHost {
    fn register_progress(&self, probe: ProgressProbe) {
        self.probes.lock().unwrap().push(probe);
    }

    fn complete(&self, completion: HostCompletion) {
        self.completions.lock().unwrap().push(Completion {
            has_resource: completion.resource.is_some(),
            success: completion.success,
            error: completion.error.map(|e| e.to_string()),
        });
    }

    fn version_cache(&self) -> Option<Arc<dyn VersionCache>> {
        self.cache
            .as_ref()
            .map(|cache| Arc::clone(cache) as Arc<dyn VersionCache>)
    }
}

/// Sink that records event kinds and keeps failure resolutions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    kinds: Mutex<Vec<&'static str>>,
    retries: Mutex<Vec<(u32, u32)>>,
    failures: Mutex<Vec<FailureResolution>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn retries(&self) -> Vec<(u32, u32)> {
        self.retries.lock().unwrap().clone()
    }

    /// Removes and returns the oldest outstanding failure resolution.
    pub fn take_failure(&self) -> Option<FailureResolution> {
        let mut failures = self.failures.lock().unwrap();
        (!failures.is_empty()).then(|| failures.remove(0))
    }
}

impl BundleEventSink for RecordingSink {
    fn emit(&self, event: BundleEvent) {
        self.kinds.lock().unwrap().push(event.kind());
        match event {
            BundleEvent::Retry { attempt, max, .. } => {
                self.retries.lock().unwrap().push((attempt, max));
            }
            BundleEvent::Failure { resolution, .. } => {
                self.failures.lock().unwrap().push(resolution);
            }
            _ => {}
        }
    }
}

/// Local loader whose loads only finish when a test says so.
#[derive(Debug, Default)]
pub struct ManualLoader {
    loads: Mutex<Vec<(LocalLoad, Option<u32>)>>,
}

impl ManualLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }

    pub fn crc(&self, index: usize) -> Option<u32> {
        self.loads.lock().unwrap()[index].1
    }

    pub fn finish(&self, index: usize, bundle: Option<&'static [u8]>) {
        let load = self.loads.lock().unwrap()[index].0.clone();
        load.finish(bundle.map(bytes::Bytes::from_static));
    }
}

impl LocalLoader for ManualLoader {
    fn load(&self, path: &Path, crc: Option<u32>) -> LocalLoad {
        let load = LocalLoad::new(path);
        self.loads.lock().unwrap().push((load.clone(), crc));
        load
    }
}
