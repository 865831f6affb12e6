//! Session phases and mutable state.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use super::{BundleLocation, SessionInfo};
use crate::download::{LocalLoad, TransferHandle};
use crate::queue::TransferTicket;

/// Lifecycle phase of a [`BundleSession`](super::BundleSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Created, not started.
    Idle,
    /// An attempt is choosing between local and network loading.
    Starting,
    LocalLoading,
    /// Waiting in the request queue for a transfer slot.
    QueuedForNetwork,
    NetworkLoading,
    Succeeded,
    /// A failed transfer is about to be retried automatically.
    RetryPending,
    /// Retries are exhausted and a failure resolution is outstanding.
    FailureEscalated,
    PermanentlyFailed,
    Unloaded,
}

impl SessionPhase {
    /// Returns true for phases no attempt leaves on its own.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::PermanentlyFailed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::LocalLoading => "local_loading",
            Self::QueuedForNetwork => "queued_for_network",
            Self::NetworkLoading => "network_loading",
            Self::Succeeded => "succeeded",
            Self::RetryPending => "retry_pending",
            Self::FailureEscalated => "failure_escalated",
            Self::PermanentlyFailed => "permanently_failed",
            Self::Unloaded => "unloaded",
        };
        write!(f, "{s}")
    }
}

/// Everything a session mutates. Guarded by the session mutex.
#[derive(Debug)]
pub(super) struct SessionState {
    pub phase: SessionPhase,
    pub location: Option<BundleLocation>,
    pub info: SessionInfo,
    /// Automatic retries made since start or the last manual retry.
    pub retries: u32,
    /// Set once the forced cache-recovery retry has been spent.
    pub cache_recovery_used: bool,
    pub bytes_to_download: u64,
    pub local_load: Option<LocalLoad>,
    pub ticket: Option<TransferTicket>,
    pub transfer: Option<TransferHandle>,
    /// Bytes of a finished network transfer not yet taken by `bundle()`.
    pub downloaded: Option<Bytes>,
    pub bundle: Option<Bytes>,
    pub host_notified: bool,
    /// Bumped on every attempt and on unload; completions from an older
    /// generation are ignored.
    pub generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            location: None,
            info: SessionInfo::default(),
            retries: 0,
            cache_recovery_used: false,
            bytes_to_download: 0,
            local_load: None,
            ticket: None,
            transfer: None,
            downloaded: None,
            bundle: None,
            host_notified: false,
            generation: 0,
        }
    }

    /// Resets for a fresh start at `location`, keeping the generation counter.
    pub fn reset(&mut self, location: BundleLocation, bytes_to_download: u64) {
        let generation = self.generation + 1;
        let options = location.options.as_ref();
        let info = SessionInfo {
            internal_id: location.internal_id.clone(),
            bundle_name: options.map(|o| o.bundle_name.clone()),
            hash: options.and_then(|o| o.hash.clone()).filter(|h| !h.is_empty()),
        };
        *self = Self {
            location: Some(location),
            info,
            bytes_to_download,
            generation,
            ..Self::new()
        };
    }

    /// Drops every in-flight reference.
    pub fn clear_inflight(&mut self) {
        self.local_load = None;
        self.ticket = None;
        self.transfer = None;
    }

    pub fn retry_ceiling(&self) -> u32 {
        self.location
            .as_ref()
            .and_then(|l| l.options.as_ref())
            .map_or(0, |o| o.retry_count)
    }

    pub fn has_options(&self) -> bool {
        self.location.as_ref().is_some_and(|l| l.options.is_some())
    }

    /// Progress of whatever is currently loading.
    pub fn percent_complete(&self) -> f32 {
        if let Some(transfer) = &self.transfer {
            transfer.progress()
        } else if let Some(load) = &self.local_load {
            load.progress()
        } else {
            0.0
        }
    }
}
