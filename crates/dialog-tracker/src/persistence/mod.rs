//! Dialog persistence hook
//!
//! The tracker does not talk to a database. When a persistence mode is
//! configured it hands snapshots to a [`DialogPersistence`] implementation
//! after releasing the dialog lock. Failures are logged and never affect
//! call processing.

use serde::{Serialize, Deserialize};

use crate::dialog::DialogSnapshot;

/// When dialogs are written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Never
    #[default]
    None,
    /// On every significant change
    Realtime,
    /// Periodically, for dialogs flagged as changed
    Delayed,
}

/// Storage backend for dialog state
pub trait DialogPersistence: Send + Sync {
    /// Store or update a dialog
    fn flush(&self, dialog: &DialogSnapshot) -> anyhow::Result<()>;

    /// Forget a dialog that reached its terminal state
    fn remove(&self, dialog: &DialogSnapshot) -> anyhow::Result<()>;
}
