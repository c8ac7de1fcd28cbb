//! Sequential (in-dialog) request handling

use std::sync::Arc;

use tracing::{debug, warn};

use super::core::DialogManager;
use super::current;
use super::transitions::EventContext;
use crate::dialog::{Dialog, DialogSnapshot};
use crate::errors::DialogError;
use crate::events::CallbackKind;
use crate::message::{Method, SipMessage, present};
use crate::routing::{DialogMatcher, Direction};
use crate::state_machine::{Outcome, StateEvent, Transition};
use crate::transaction::{TransactionInterest, TransactionKey};

/// Where a matched in-dialog request should go next
#[derive(Debug, Clone)]
pub struct Routing {
    pub dialog: Arc<Dialog>,
    /// Step the request caused
    pub transition: Transition,
    /// Contact of the leg the request travels to, if known
    pub target: Option<String>,
    /// Route set toward that leg
    pub route_set: Vec<String>,
    /// Dialog as left by the request
    pub snapshot: DialogSnapshot,
}

/// Result of [`DialogManager::on_sequential_request`]
#[derive(Debug, Clone)]
pub enum SequentialOutcome {
    /// Callee to caller
    RoutedUpstream(Routing),
    /// Caller to callee
    RoutedDownstream(Routing),
    /// Not part of any dialog known here
    NotFound,
    Error(DialogError),
}

impl SequentialOutcome {
    pub fn routing(&self) -> Option<&Routing> {
        match self {
            SequentialOutcome::RoutedUpstream(routing) | SequentialOutcome::RoutedDownstream(routing) => Some(routing),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SequentialOutcome::NotFound)
    }
}

impl DialogManager {
    /// Match an in-dialog request and advance its dialog
    ///
    /// Malformed requests (no Call-ID, From-tag or To-tag) are reported as
    /// [`SequentialOutcome::NotFound`] without touching any dialog.
    pub fn on_sequential_request<M: SipMessage>(
        &self,
        msg: &M,
        transaction: Option<&TransactionKey>,
    ) -> SequentialOutcome {
        let Some(method) = msg.method() else {
            return SequentialOutcome::Error(DialogError::protocol_error("sequential request expected, got a response"));
        };

        let matcher = DialogMatcher::new(&self.table, self.config.match_mode, &self.config.rr_param);
        let matched = match matcher.match_request(msg, method == Method::Cancel) {
            Ok(Some(matched)) => matched,
            Ok(None) => return SequentialOutcome::NotFound,
            Err(e) => {
                warn!("cannot match {}: {}", method, e);
                return SequentialOutcome::NotFound;
            }
        };
        let dialog = matched.dialog;
        let direction = matched.direction;
        current::set_current(msg.message_id(), &dialog);

        let event = StateEvent::from_method(&method);
        let step = match self.drive(&dialog, event, EventContext::message(msg, direction)) {
            Ok(step) => step,
            Err(e) => return SequentialOutcome::Error(e),
        };

        if event != StateEvent::ReqCancel {
            self.callbacks.run(CallbackKind::ReqWithin, &step.snapshot, Some(msg), direction);
        }

        self.watch_transaction(msg, &method, transaction, &dialog, &step.transition, direction);

        let (target, route_set) = {
            let inner = dialog.lock();
            match direction {
                Direction::Upstream => (Some(inner.caller.contact.clone()), inner.caller.route_set.clone()),
                _ => match inner.downstream_leg(present(msg.to_tag())) {
                    Some(leg) => (Some(leg.contact.clone()), leg.route_set.clone()),
                    None => (None, Vec::new()),
                },
            }
        };
        let target = target.filter(|contact| !contact.is_empty());

        debug!("{} routed {} in dialog {}", method, direction, step.snapshot.key);
        let routing = Routing { dialog, transition: step.transition, target, route_set, snapshot: step.snapshot };
        match direction {
            Direction::Upstream => SequentialOutcome::RoutedUpstream(routing),
            _ => SequentialOutcome::RoutedDownstream(routing),
        }
    }

    /// Ask for the responses of a sequential request when anyone cares
    fn watch_transaction<M: SipMessage>(
        &self,
        msg: &M,
        method: &Method,
        transaction: Option<&TransactionKey>,
        dialog: &Arc<Dialog>,
        transition: &Transition,
        direction: Direction,
    ) {
        let interest = if transition.outcome == Some(Outcome::Terminated) {
            TransactionInterest::Termination
        } else if !transition.to.is_deleted()
            && !matches!(method, Method::Ack | Method::Cancel)
            && self.callbacks.has(CallbackKind::ResponseWithin)
        {
            TransactionInterest::WithinDialog
        } else {
            return;
        };

        let key = transaction.cloned().or_else(|| {
            let call_id = msg.call_id()?;
            self.transaction_layer.lookup_transaction(call_id, msg.cseq()?)
        });
        let Some(key) = key else {
            debug!("no transaction for {} in dialog {}", method, dialog.key());
            return;
        };
        if let Err(e) = self.bind_transaction(key, dialog, interest, direction) {
            warn!("cannot watch {} transaction of dialog {}: {}", method, dialog.key(), e);
        }
    }
}
