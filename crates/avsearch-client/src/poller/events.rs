//! Poller events.
//!
//! Events emitted by a poll subscription so front ends can react to status
//! changes and fetch errors without reading snapshots in a loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::status::{JobStatus, ProcessingStatus};
use crate::ArtifactKey;

/// Events emitted by a poll subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollEvent {
    /// A fetch succeeded and the cached status was replaced.
    Updated {
        artifact: ArtifactKey,
        status: JobStatus,
        /// Whether the status differs from the previous one.
        changed: bool,
        timestamp: DateTime<Utc>,
    },
    /// A fetch failed; the last known status is retained.
    FetchFailed {
        artifact: ArtifactKey,
        error_message: String,
        transient: bool,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },
    /// The job reached a final status and polling stopped.
    Finished {
        artifact: ArtifactKey,
        overall: ProcessingStatus,
        timestamp: DateTime<Utc>,
    },
    /// Polling stopped after too many consecutive failures.
    GaveUp {
        artifact: ArtifactKey,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },
    /// The subscription was stopped by its owner.
    Stopped {
        artifact: ArtifactKey,
        timestamp: DateTime<Utc>,
    },
}

impl PollEvent {
    pub fn artifact(&self) -> &ArtifactKey {
        match self {
            PollEvent::Updated { artifact, .. }
            | PollEvent::FetchFailed { artifact, .. }
            | PollEvent::Finished { artifact, .. }
            | PollEvent::GaveUp { artifact, .. }
            | PollEvent::Stopped { artifact, .. } => artifact,
        }
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            PollEvent::Updated {
                artifact, status, ..
            } => {
                format!("{}: {}", artifact.file_name(), status.overall())
            }
            PollEvent::FetchFailed {
                artifact,
                error_message,
                consecutive_failures,
                ..
            } => {
                format!(
                    "{}: status unavailable: {} (attempt {})",
                    artifact.file_name(),
                    error_message,
                    consecutive_failures
                )
            }
            PollEvent::Finished {
                artifact, overall, ..
            } => {
                format!("{}: finished with {}", artifact.file_name(), overall)
            }
            PollEvent::GaveUp {
                artifact,
                consecutive_failures,
                ..
            } => {
                format!(
                    "{}: gave up after {} failed attempts",
                    artifact.file_name(),
                    consecutive_failures
                )
            }
            PollEvent::Stopped { artifact, .. } => {
                format!("{}: polling stopped", artifact.file_name())
            }
        }
    }

    /// Whether the event ends the subscription.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PollEvent::Finished { .. } | PollEvent::GaveUp { .. } | PollEvent::Stopped { .. }
        )
    }
}

/// Broadcaster for poll events.
pub struct PollEventBroadcaster {
    sender: broadcast::Sender<PollEvent>,
}

impl PollEventBroadcaster {
    /// Create a new broadcaster with default capacity (64).
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: PollEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PollEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PollEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
