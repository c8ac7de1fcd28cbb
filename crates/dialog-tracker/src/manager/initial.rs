//! Dialog creation from initial requests

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::core::DialogManager;
use super::current;
use crate::dialog::{CallerLeg, Dialog, DialogFlags, DialogInner, DialogSnapshot};
use crate::errors::{DialogError, DialogResult};
use crate::events::{CallbackKind, DialogEvent};
use crate::message::{Method, SipMessage, present};
use crate::routing::Direction;
use crate::transaction::{TransactionInterest, TransactionKey};

/// Per-request overrides for a new dialog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogOptions {
    /// Lifetime in seconds once confirmed
    pub lifetime: Option<u32>,
    /// Seconds the dialog may stay unanswered once ringing
    pub no_answer_timeout: Option<u32>,
    /// Send BYE to both legs when the dialog expires
    pub bye_on_timeout: Option<bool>,
    /// Variables the dialog starts with
    pub vars: BTreeMap<String, String>,
}

impl DialogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifetime(mut self, secs: u32) -> Self {
        self.lifetime = Some(secs);
        self
    }

    pub fn with_no_answer_timeout(mut self, secs: u32) -> Self {
        self.no_answer_timeout = Some(secs);
        self
    }

    pub fn with_bye_on_timeout(mut self, enabled: bool) -> Self {
        self.bye_on_timeout = Some(enabled);
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl DialogManager {
    /// Create a dialog for an initial request
    ///
    /// Returns `Ok(None)` for requests that never create dialogs (ACK,
    /// CANCEL, anything already carrying a To-tag). A request that spirals
    /// back through this server yields the dialog created by its first pass.
    ///
    /// On success the dialog route parameter has been added to `msg` and the
    /// initial transaction, when known, is bound to the dialog.
    pub fn on_initial_request<M: SipMessage>(
        &self,
        msg: &mut M,
        transaction: Option<&TransactionKey>,
        options: DialogOptions,
    ) -> DialogResult<Option<Arc<Dialog>>> {
        let Some(method) = msg.method() else {
            return Err(DialogError::protocol_error("initial request expected, got a response"));
        };
        if matches!(method, Method::Ack | Method::Cancel) {
            return Ok(None);
        }
        if present(msg.to_tag()).is_some() {
            debug!("{} carries a To-tag, not an initial request", method);
            return Ok(None);
        }

        let call_id = present(msg.call_id())
            .ok_or_else(|| DialogError::protocol_error("initial request without Call-ID"))?
            .to_string();
        let from_tag = present(msg.from_tag())
            .ok_or_else(|| DialogError::protocol_error("initial request without From-tag"))?
            .to_string();
        let cseq = msg
            .cseq()
            .ok_or_else(|| DialogError::protocol_error("initial request without CSeq"))?;

        if self.config.detect_spirals {
            if let Some(dialog) = self.handle_spiral(msg, &method, &call_id, &from_tag)? {
                return Ok(Some(dialog));
            }
        }

        let contact = present(msg.contact())
            .ok_or_else(|| DialogError::protocol_error("initial request without Contact"))?
            .to_string();

        let lifetime = options.lifetime.unwrap_or(self.config.default_timeout);
        let no_answer = options.no_answer_timeout.unwrap_or(self.config.no_answer_timeout);
        let caller = CallerLeg::from_request(&*msg, &from_tag, cseq, &contact);
        let mut inner = DialogInner::new(caller, msg.request_uri().unwrap_or_default(), lifetime, no_answer);
        if options.bye_on_timeout.unwrap_or(self.config.bye_on_timeout) {
            inner.flags.insert(DialogFlags::TO_BYE);
        }
        inner.vars = options.vars;

        let entry = self.table.hash_entry(&call_id);
        let dialog = Arc::new(Dialog::new(&call_id, &from_tag, entry, inner));
        let key = self.table.insert(&dialog);
        let did = key.to_route_param();
        dialog.lock().did = did.clone();

        if let Err(e) = msg.add_route_param(&self.config.rr_param, &did) {
            self.table.remove(&dialog);
            return Err(DialogError::internal(format!("failed to add route parameter: {e:#}")));
        }

        let transaction = transaction
            .cloned()
            .or_else(|| self.transaction_layer.lookup_transaction(&call_id, cseq));
        match transaction {
            Some(tx) => {
                if let Err(e) = self.bind_transaction(tx, &dialog, TransactionInterest::DialogSetup, Direction::Downstream) {
                    self.table.remove(&dialog);
                    return Err(e);
                }
            }
            None => warn!("no transaction for {} creating dialog {}, left to stale cleanup", method, key),
        }

        info!("created dialog {} for {} call_id={}", key, method, call_id);
        self.stats.record_created();
        let snapshot = dialog.snapshot();
        self.callbacks.run(CallbackKind::Created, &snapshot, Some(&*msg), Direction::Downstream);
        self.events.publish(DialogEvent::Created { key, call_id });
        current::set_current(msg.message_id(), &dialog);

        Ok(Some(dialog))
    }

    /// Recognize an initial request that already created a dialog
    fn handle_spiral<M: SipMessage>(
        &self,
        msg: &mut M,
        method: &Method,
        call_id: &str,
        from_tag: &str,
    ) -> DialogResult<Option<Arc<Dialog>>> {
        let Some((dialog, _)) = self.table.lookup_by_key(call_id, from_tag, None, true) else {
            return Ok(None);
        };

        let snapshot: DialogSnapshot = {
            let mut inner = dialog.lock();
            inner.flags.insert(DialogFlags::SPIRALED);
            DialogSnapshot::capture(&dialog, &inner)
        };
        debug!("{} spiraled back to dialog {}", method, snapshot.key);

        if *method == Method::Invite {
            msg.add_route_param(&self.config.rr_param, &snapshot.key.to_route_param())
                .map_err(|e| DialogError::internal(format!("failed to add route parameter: {e:#}")))?;
        }

        self.stats.record_spiral();
        self.callbacks.run(CallbackKind::Spiraled, &snapshot, Some(&*msg), Direction::Downstream);
        self.events.publish(DialogEvent::Spiraled { key: snapshot.key });
        current::set_current(msg.message_id(), &dialog);
        Ok(Some(dialog))
    }
}
