//! Transaction events: responses and transaction teardown
//!
//! The transaction layer reports events only for transactions the manager
//! bound with [`TransactionLayer::register_callback`]. What an event means
//! depends on why the transaction was bound:
//!
//! ```text
//! DialogSetup   ResponseIn        → state machine (1xx / 2xx), a 3xx+
//!                                   retires that branch's leg
//!               ResponseForwarded → RESPONSE_FORWARDED callbacks, a final
//!                                   3xx+ fails the dialog
//!               Destroyed         → state machine (TDEL), binding dropped
//! WithinDialog  ResponseIn        → RESPONSE_WITHIN callbacks
//! Termination   final ResponseIn  → TERMINATED_CONFIRMED callbacks
//! ```
//!
//! [`TransactionLayer::register_callback`]: crate::transaction::TransactionLayer::register_callback

use tracing::{debug, trace};

use super::core::{DialogManager, TransactionBinding};
use super::transitions::EventContext;
use crate::errors::DialogResult;
use crate::events::CallbackKind;
use crate::message::SipMessage;
use crate::routing::Direction;
use crate::state_machine::{StateEvent, Transition};
use crate::transaction::{TransactionEvent, TransactionInterest, TransactionKey};

impl DialogManager {
    /// Entry point for the transaction layer
    pub fn on_transaction_event(
        &self,
        transaction: &TransactionKey,
        event: TransactionEvent<'_>,
    ) -> DialogResult<Option<Transition>> {
        trace!("transaction {} event {:?}", transaction, event);
        match event {
            TransactionEvent::ResponseIn(response) => self.on_response(transaction, response),
            TransactionEvent::ResponseForwarded(response) => self.on_response_forwarded(transaction, response),
            TransactionEvent::Destroyed => self.on_transaction_destroyed(transaction),
        }
    }

    /// A response arrived on a bound transaction
    ///
    /// Returns the state machine step for setup transactions.
    pub fn on_response(
        &self,
        transaction: &TransactionKey,
        response: &dyn SipMessage,
    ) -> DialogResult<Option<Transition>> {
        let Some(binding) = self.binding(transaction) else {
            debug!("response on unbound transaction {}", transaction);
            return Ok(None);
        };
        let Some(code) = response.status_code() else {
            return Ok(None);
        };
        let direction = opposite(binding.direction);

        match binding.interest {
            TransactionInterest::DialogSetup => {
                let Some(event) = StateEvent::from_status(code) else {
                    return Ok(None);
                };
                let step = self.drive(&binding.dialog, event, EventContext::message(response, direction))?;
                Ok(Some(step.transition))
            }
            TransactionInterest::WithinDialog => {
                let snapshot = binding.dialog.snapshot();
                self.callbacks.run(CallbackKind::ResponseWithin, &snapshot, Some(response), direction);
                Ok(None)
            }
            TransactionInterest::Termination => {
                if code >= 200 {
                    self.transactions.remove(transaction);
                    let snapshot = binding.dialog.snapshot();
                    debug!("BYE for dialog {} answered with {}", snapshot.key, code);
                    self.callbacks
                        .run(CallbackKind::TerminatedConfirmed, &snapshot, Some(response), direction);
                }
                Ok(None)
            }
        }
    }

    /// The transaction layer relayed a response upstream
    ///
    /// For a forked INVITE a final negative response is relayed only once
    /// every branch has completed, so this is where setup failure lands.
    pub fn on_response_forwarded(
        &self,
        transaction: &TransactionKey,
        response: &dyn SipMessage,
    ) -> DialogResult<Option<Transition>> {
        let Some(binding) = self.binding(transaction) else {
            return Ok(None);
        };
        if binding.interest != TransactionInterest::DialogSetup {
            return Ok(None);
        }
        let direction = opposite(binding.direction);
        let snapshot = binding.dialog.snapshot();
        self.callbacks
            .run(CallbackKind::ResponseForwarded, &snapshot, Some(response), direction);

        match response.status_code() {
            Some(code) if code >= 300 => {
                let ctx = EventContext::relayed(response, direction);
                let step = self.drive(&binding.dialog, StateEvent::Rpl3xx, ctx)?;
                Ok(Some(step.transition))
            }
            _ => Ok(None),
        }
    }

    /// The transaction layer freed a bound transaction
    ///
    /// Drops the binding's dialog reference. A setup transaction that dies
    /// before the dialog was answered takes the dialog with it.
    pub fn on_transaction_destroyed(&self, transaction: &TransactionKey) -> DialogResult<Option<Transition>> {
        let Some((_, binding)) = self.transactions.remove(transaction) else {
            return Ok(None);
        };
        if binding.interest != TransactionInterest::DialogSetup {
            return Ok(None);
        }
        let step = self.drive(&binding.dialog, StateEvent::TransactionDestroyed, EventContext::internal())?;
        Ok(Some(step.transition))
    }

    fn binding(&self, transaction: &TransactionKey) -> Option<TransactionBinding> {
        self.transactions.get(transaction).map(|binding| binding.value().clone())
    }
}

fn opposite(direction: Direction) -> Direction {
    match direction {
        Direction::Downstream => Direction::Upstream,
        Direction::Upstream => Direction::Downstream,
        Direction::None => Direction::None,
    }
}
