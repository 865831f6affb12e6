//! Session lifecycle events and the sinks that receive them.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use super::BundleSession;

/// Identifies the session an event belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Location id the session was started with.
    pub internal_id: String,
    /// Bundle name from the request options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_name: Option<String>,
    /// Expected version hash from the request options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Lifecycle event emitted by a [`BundleSession`].
#[derive(Debug)]
pub enum BundleEvent {
    /// An attempt is starting. Emitted once per attempt, retries included.
    Start(SessionInfo),
    /// A network transfer finished, successfully or not.
    Complete(SessionInfo),
    /// The network transfer succeeded and the host has been told.
    Success(SessionInfo),
    /// The transformed location looked like a URL but could not be parsed.
    MalformedLocator(SessionInfo),
    /// A failed transfer is being retried automatically.
    Retry {
        info: SessionInfo,
        /// Retries already made before this one.
        attempt: u32,
        /// Retry ceiling from the request options.
        max: u32,
    },
    /// Automatic retries are exhausted; the receiver decides what happens next.
    Failure {
        info: SessionInfo,
        resolution: FailureResolution,
    },
    /// The session released its bundle.
    Unload(SessionInfo),
}

impl BundleEvent {
    /// The session this event belongs to.
    #[must_use]
    pub fn info(&self) -> &SessionInfo {
        match self {
            Self::Start(info)
            | Self::Complete(info)
            | Self::Success(info)
            | Self::MalformedLocator(info)
            | Self::Unload(info)
            | Self::Retry { info, .. }
            | Self::Failure { info, .. } => info,
        }
    }

    /// Short event name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Complete(_) => "complete",
            Self::Success(_) => "success",
            Self::MalformedLocator(_) => "malformed_locator",
            Self::Retry { .. } => "retry",
            Self::Failure { .. } => "failure",
            Self::Unload(_) => "unload",
        }
    }
}

/// The two ways out of an escalated failure.
///
/// Both methods consume the resolution, so at most one of them ever runs.
/// Dropping it without choosing leaves the session waiting and the host
/// uninformed.
pub struct FailureResolution {
    session: BundleSession,
    generation: u64,
}

impl FailureResolution {
    pub(super) fn new(session: BundleSession, generation: u64) -> Self {
        Self {
            session,
            generation,
        }
    }

    /// The escalated session.
    #[must_use]
    pub fn session(&self) -> &BundleSession {
        &self.session
    }

    /// Resets the retry counter and starts a fresh attempt.
    pub fn retry(self) {
        self.session.retry_after_failure(self.generation);
    }

    /// Reports the failure to the host, without an error payload.
    pub fn give_up(self) {
        self.session.give_up_after_failure(self.generation);
    }
}

impl fmt::Debug for FailureResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureResolution")
            .field("internal_id", &self.session.info().internal_id)
            .finish_non_exhaustive()
    }
}

/// Receiver of session lifecycle events.
///
/// `emit` is called without any session lock held, so implementations may
/// call straight back into the session.
pub trait BundleEventSink: Send + Sync {
    fn emit(&self, event: BundleEvent);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl BundleEventSink for NoopEventSink {
    fn emit(&self, event: BundleEvent) {
        debug!(event = event.kind(), "dropping bundle event");
    }
}

/// Sink forwarding events into a tokio unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: UnboundedSender<BundleEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, UnboundedReceiver<BundleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl BundleEventSink for ChannelEventSink {
    fn emit(&self, event: BundleEvent) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            warn!(
                event = event.kind(),
                internal_id = %event.info().internal_id,
                "event receiver dropped; event lost"
            );
        }
    }
}
