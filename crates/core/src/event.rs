//! Domain events: what the orchestrator did, for whoever is listening.
//!
//! The orchestrator never touches rendering state. It publishes events here and
//! the presentation layer subscribes to the ones it cares about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::FailureKind;
use crate::mode::Mode;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// The generation state machine moved.
    StateChanged {
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// An attempt failed and the fallback chain escalated.
    Escalated {
        from_provider: String,
        to_provider: String,
        reason: String,
        hop: usize,
        timestamp: DateTime<Utc>,
    },

    /// Conversation memory was wiped by the daily reset or the quota gate.
    MemoryReset {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A builder result was written into the project.
    FilesApplied {
        count: usize,
        entry_path: Option<String>,
        timestamp: DateTime<Utc>,
    },

    VersionSaved {
        version_id: u64,
        file_count: usize,
        timestamp: DateTime<Utc>,
    },

    GenerationCompleted {
        mode: Mode,
        provider: String,
        escalations: usize,
        timestamp: DateTime<Utc>,
    },

    GenerationFailed {
        mode: Mode,
        kind: FailureKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A collaborator (persistence, usage) call failed; the generation went on.
    CollaboratorError {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
