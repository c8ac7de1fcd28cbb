//! Dialog events
//!
//! Lifecycle notifications published on an optional tokio channel, for
//! consumers that prefer an event stream over synchronous callbacks.

use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dialog::{DialogKey, DialogState};

/// Dialog lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogEvent {
    /// Dialog created by an initial request
    Created {
        key: DialogKey,
        call_id: String,
    },

    /// Dialog state changed
    StateChanged {
        key: DialogKey,
        old_state: DialogState,
        new_state: DialogState,
    },

    /// Initial request spiraled back to an existing dialog
    Spiraled {
        key: DialogKey,
    },

    /// Sibling dialog spawned for a concurrently confirmed leg
    ConcurrentSpawned {
        parent: DialogKey,
        key: DialogKey,
    },

    /// Dialog reached its terminal state
    Terminated {
        key: DialogKey,
        reason: String,
    },
}

/// Non-blocking publisher for [`DialogEvent`]s
#[derive(Debug, Default)]
pub struct EventPublisher {
    sender: RwLock<Option<mpsc::Sender<DialogEvent>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route events to `sender`, replacing any previous channel
    pub fn set_sender(&self, sender: mpsc::Sender<DialogEvent>) {
        *self.sender.write() = Some(sender);
    }

    pub fn clear(&self) {
        *self.sender.write() = None;
    }

    /// Publish without blocking; full or closed channels drop the event
    pub fn publish(&self, event: DialogEvent) {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("dialog event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("dialog event channel closed");
            }
        }
    }
}
