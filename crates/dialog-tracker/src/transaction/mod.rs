//! Transaction layer integration
//!
//! The tracker sits on top of a transaction layer it does not own. It
//! asks that layer to report events for the transactions it cares about,
//! receives them back as [`TransactionEvent`] values through the manager,
//! and hands it fully described in-dialog requests to send.
//!
//! ```text
//!  DialogManager ──register_callback(key, interest)──▶ TransactionLayer
//!        ▲                                                  │
//!        └──────── on_transaction_event(key, event) ────────┘
//! ```

pub mod request_template;

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::message::SipMessage;

pub use request_template::{InDialogRequest, LegSide};

/// Opaque identifier of a transaction in the external transaction layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionKey(String);

impl TransactionKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why the tracker wants events for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionInterest {
    /// Transaction that created the dialog: responses, forwarded
    /// responses and destruction
    DialogSetup,
    /// Sequential request whose responses feed within-dialog callbacks
    WithinDialog,
    /// BYE whose response confirms termination
    Termination,
}

/// Notification from the transaction layer
#[derive(Clone, Copy)]
pub enum TransactionEvent<'a> {
    /// Response received for the transaction
    ResponseIn(&'a dyn SipMessage),
    /// Response relayed upstream; a final one only once every branch completed
    ResponseForwarded(&'a dyn SipMessage),
    /// No further retransmissions or responses are possible
    Destroyed,
}

impl fmt::Debug for TransactionEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionEvent::ResponseIn(msg) => write!(f, "ResponseIn({:?})", msg.status_code()),
            TransactionEvent::ResponseForwarded(msg) => write!(f, "ResponseForwarded({:?})", msg.status_code()),
            TransactionEvent::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// Services the tracker consumes from the transaction layer
pub trait TransactionLayer: Send + Sync {
    /// Ask for events on `transaction` to be delivered to the manager
    fn register_callback(&self, transaction: &TransactionKey, interest: TransactionInterest) -> anyhow::Result<()>;

    /// Find the server transaction for a request
    fn lookup_transaction(&self, call_id: &str, cseq: u32) -> Option<TransactionKey>;

    /// Send a request generated by the tracker (BYE on timeout, admin termination)
    fn send_request(&self, request: InDialogRequest) -> anyhow::Result<()>;
}
