//! Callback registry
//!
//! Interested modules register closures per [`CallbackKind`]. Handlers run
//! synchronously on the worker that caused the event, after the dialog lock
//! has been released, and receive an immutable [`DialogSnapshot`] rather
//! than the live record. A handler may therefore call back into the
//! manager for the same dialog without deadlocking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use tracing::trace;

use crate::dialog::DialogSnapshot;
use crate::message::SipMessage;
use crate::routing::Direction;
use crate::state_machine::Outcome;

/// Event categories a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackKind {
    Created,
    Early,
    ConfirmedNa,
    Confirmed,
    /// Setup failed or was cancelled
    Failed,
    Terminated,
    /// Response to the terminating BYE
    TerminatedConfirmed,
    Expired,
    Spiraled,
    /// In-dialog request seen
    ReqWithin,
    /// Response to an in-dialog request
    ResponseWithin,
    /// Response of the initial transaction forwarded
    ResponseForwarded,
}

impl CallbackKind {
    /// Category fired for a state machine outcome
    pub fn for_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Early => CallbackKind::Early,
            Outcome::ConfirmedNa | Outcome::ConcurrentlyConfirmed => CallbackKind::ConfirmedNa,
            Outcome::Confirmed => CallbackKind::Confirmed,
            Outcome::Failed | Outcome::Cancelled => CallbackKind::Failed,
            Outcome::Terminated => CallbackKind::Terminated,
            Outcome::Expired => CallbackKind::Expired,
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Arguments handed to every callback
pub struct CallbackParams<'a> {
    pub kind: CallbackKind,
    pub dialog: &'a DialogSnapshot,
    /// Message that triggered the event, absent for timer and admin events
    pub message: Option<&'a dyn SipMessage>,
    pub direction: Direction,
}

/// A registered handler
pub type DialogCallback = Arc<dyn Fn(&CallbackParams<'_>) + Send + Sync>;

/// Handlers per category, run in registration order
#[derive(Default)]
pub struct DialogCallbacks {
    handlers: RwLock<HashMap<CallbackKind, Vec<DialogCallback>>>,
}

impl fmt::Debug for DialogCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<CallbackKind, usize> = self
            .handlers
            .read()
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("DialogCallbacks").field("handlers", &counts).finish()
    }
}

impl DialogCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one category
    pub fn register<F>(&self, kind: CallbackKind, handler: F)
    where
        F: Fn(&CallbackParams<'_>) + Send + Sync + 'static,
    {
        self.handlers.write().entry(kind).or_default().push(Arc::new(handler));
    }

    /// Whether any handler listens to `kind`
    pub fn has(&self, kind: CallbackKind) -> bool {
        self.handlers.read().get(&kind).is_some_and(|list| !list.is_empty())
    }

    /// Run every handler for `kind`, returning how many ran
    pub fn run(
        &self,
        kind: CallbackKind,
        dialog: &DialogSnapshot,
        message: Option<&dyn SipMessage>,
        direction: Direction,
    ) -> usize {
        let handlers = match self.handlers.read().get(&kind) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return 0,
        };
        trace!("running {} {} callback(s) for dialog {}", handlers.len(), kind, dialog.key);
        let params = CallbackParams { kind, dialog, message, direction };
        for handler in &handlers {
            handler(&params);
        }
        handlers.len()
    }
}
