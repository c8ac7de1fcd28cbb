//! Administration and per-dialog data
//!
//! Listing, lookup and termination for management interfaces, plus the
//! variables, flags and profile memberships routing logic attaches to a
//! dialog.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::core::DialogManager;
use super::current;
use super::transitions::EventContext;
use crate::dialog::{Dialog, DialogFlags, DialogKey, DialogSnapshot, DialogState};
use crate::errors::{DialogError, DialogResult};
use crate::message::{Method, SipMessage};
use crate::persistence::PersistenceMode;
use crate::routing::{DialogMatcher, Direction};
use crate::state_machine::{Outcome, StateEvent};
use crate::transaction::{InDialogRequest, LegSide};

/// Which legs an administrative termination sends BYE to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateSide {
    Caller,
    Callee,
    Both,
}

impl TerminateSide {
    fn legs(self) -> &'static [LegSide] {
        match self {
            TerminateSide::Caller => &[LegSide::Caller],
            TerminateSide::Callee => &[LegSide::Callee],
            TerminateSide::Both => &[LegSide::Caller, LegSide::Callee],
        }
    }
}

#[derive(Serialize)]
struct DialogListing<'a> {
    size: usize,
    dialogs: &'a [DialogSnapshot],
}

impl DialogManager {
    /// Snapshots of every linked dialog, ordered by key
    pub fn list_dialogs(&self) -> Vec<DialogSnapshot> {
        let mut dialogs: Vec<DialogSnapshot> = self.table.dialogs().iter().map(Dialog::snapshot).collect();
        dialogs.sort_by_key(|snapshot| snapshot.key);
        dialogs
    }

    /// JSON rendering of [`list_dialogs`](Self::list_dialogs)
    pub fn print_dialogs(&self) -> DialogResult<String> {
        let dialogs = self.list_dialogs();
        let listing = DialogListing { size: dialogs.len(), dialogs: &dialogs };
        Ok(serde_json::to_string_pretty(&listing)?)
    }

    pub fn get_dialog(&self, key: DialogKey) -> Option<Arc<Dialog>> {
        self.table.lookup_by_id(key)
    }

    /// Find a dialog by Call-ID and tags, in either direction
    pub fn dialog_by_key(&self, call_id: &str, from_tag: &str, to_tag: &str) -> Option<(Arc<Dialog>, Direction)> {
        self.table.lookup_by_key(call_id, from_tag, Some(to_tag), false)
    }

    /// Whether `msg` belongs to a dialog tracked here
    pub fn is_known_dialog<M: SipMessage>(&self, msg: &M) -> bool {
        if current::current_for(msg.message_id()).is_some() {
            return true;
        }
        let matcher = DialogMatcher::new(&self.table, self.config.match_mode, &self.config.rr_param);
        matches!(matcher.match_request(msg, true), Ok(Some(_)))
    }

    /// Dialog bound to `msg` by the initial or sequential request handler
    pub fn current_dialog<M: SipMessage>(&self, msg: &M) -> Option<Arc<Dialog>> {
        current::current_for(msg.message_id())
    }

    pub fn current_dialog_state<M: SipMessage>(&self, msg: &M) -> Option<DialogState> {
        self.current_dialog(msg).map(|dialog| dialog.state())
    }

    /// Lifetime in seconds of the dialog bound to `msg`
    pub fn current_dialog_lifetime<M: SipMessage>(&self, msg: &M) -> Option<u32> {
        self.current_dialog(msg).map(|dialog| dialog.lock().lifetime)
    }

    /// Change the lifetime of the dialog bound to `msg`
    ///
    /// A confirmed dialog's timer is rearmed with the new lifetime.
    pub fn set_current_dialog_lifetime<M: SipMessage>(&self, msg: &M, secs: u32) -> DialogResult<()> {
        let dialog = self
            .current_dialog(msg)
            .ok_or_else(|| DialogError::dialog_not_found("no dialog bound to message"))?;
        let mut inner = dialog.lock();
        inner.lifetime = secs;
        inner.mark_changed();
        if inner.state.is_confirmed() {
            self.timer.rearm(&dialog, std::time::Duration::from_secs(u64::from(secs)));
        }
        Ok(())
    }

    /// Absolute expiry of a dialog with an armed timer
    pub fn dialog_expires(&self, key: DialogKey) -> Option<DateTime<Utc>> {
        let dialog = self.table.lookup_by_id(key)?;
        let deadline = self.timer.deadline(&dialog)?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let remaining = chrono::Duration::from_std(remaining).ok()?;
        Some(Utc::now() + remaining)
    }

    /// End a confirmed dialog from outside, sending BYE to the chosen legs
    ///
    /// Returns the number of BYE requests handed to the transaction layer.
    /// Nothing is sent when the dialog is not confirmed or was ended
    /// concurrently.
    pub fn terminate_dialog(&self, key: DialogKey, side: TerminateSide) -> DialogResult<usize> {
        let dialog = self
            .table
            .lookup_by_id(key)
            .ok_or_else(|| DialogError::dialog_not_found(&key.to_string()))?;
        // the transition decides under the dialog lock whether this call ends it
        let step = self.drive(&dialog, StateEvent::ReqBye, EventContext::internal())?;
        if step.transition.outcome != Some(Outcome::Terminated) {
            return Err(DialogError::invalid_state("a confirmed state", step.transition.from));
        }

        let mut sent = 0;
        for leg in side.legs() {
            let Some(request) = InDialogRequest::for_leg(&step.snapshot, Method::Bye, *leg) else {
                warn!("dialog {} has no target for BYE toward {:?}", key, leg);
                continue;
            };
            match self.transaction_layer.send_request(request) {
                Ok(()) => sent += 1,
                Err(e) => warn!("failed to send BYE toward {:?} for dialog {}: {:#}", leg, key, e),
            }
        }
        info!("dialog {} terminated by request, {} BYE(s) sent", key, sent);
        Ok(sent)
    }

    /// Flush every dialog flagged as changed, clearing the flag
    ///
    /// Returns the number of dialogs written.
    pub fn flush_changed(&self) -> usize {
        if self.persistence.is_none() || self.config.persistence_mode == PersistenceMode::None {
            return 0;
        }
        let mut flushed = 0;
        for dialog in self.table.dialogs() {
            let snapshot = {
                let mut inner = dialog.lock();
                if !inner.state.is_confirmed()
                    || !(inner.flags.contains(DialogFlags::CHANGED) || inner.flags.contains(DialogFlags::CHANGED_VARS))
                {
                    continue;
                }
                inner.flags.remove(DialogFlags::CHANGED);
                inner.flags.remove(DialogFlags::CHANGED_VARS);
                DialogSnapshot::capture(&dialog, &inner)
            };
            if self.flush(&snapshot) {
                flushed += 1;
            } else {
                let mut inner = dialog.lock();
                inner.flags.insert(DialogFlags::CHANGED);
            }
        }
        if flushed > 0 {
            debug!("flushed {} changed dialog(s)", flushed);
        }
        flushed
    }

    /// Set a dialog variable
    pub fn set_var(&self, dialog: &Arc<Dialog>, name: &str, value: &str) {
        let snapshot = {
            let mut inner = dialog.lock();
            inner.vars.insert(name.to_string(), value.to_string());
            inner.flags.insert(DialogFlags::CHANGED_VARS);
            inner.state.is_confirmed().then(|| DialogSnapshot::capture(dialog, &inner))
        };
        self.flush_vars(snapshot);
    }

    pub fn get_var(&self, dialog: &Dialog, name: &str) -> Option<String> {
        dialog.lock().vars.get(name).cloned()
    }

    /// Remove a dialog variable, returning its value
    pub fn remove_var(&self, dialog: &Arc<Dialog>, name: &str) -> Option<String> {
        let (value, snapshot) = {
            let mut inner = dialog.lock();
            let value = inner.vars.remove(name);
            if value.is_some() {
                inner.flags.insert(DialogFlags::CHANGED_VARS);
            }
            let snapshot = (value.is_some() && inner.state.is_confirmed()).then(|| DialogSnapshot::capture(dialog, &inner));
            (value, snapshot)
        };
        self.flush_vars(snapshot);
        value
    }

    fn flush_vars(&self, snapshot: Option<DialogSnapshot>) {
        if self.config.persistence_mode != PersistenceMode::Realtime {
            return;
        }
        if let Some(snapshot) = snapshot {
            self.flush(&snapshot);
        }
    }

    /// Set script flag `flag` (0..=31); false if out of range
    pub fn set_flag(&self, dialog: &Dialog, flag: u8) -> bool {
        dialog.lock().script_flags.set(flag)
    }

    pub fn reset_flag(&self, dialog: &Dialog, flag: u8) -> bool {
        dialog.lock().script_flags.reset(flag)
    }

    pub fn is_flag_set(&self, dialog: &Dialog, flag: u8) -> bool {
        dialog.lock().script_flags.is_set(flag)
    }

    /// Add the dialog to a declared profile
    pub fn set_profile(&self, dialog: &Dialog, name: &str, value: Option<&str>) -> DialogResult<()> {
        if dialog.state().is_deleted() {
            return Err(DialogError::invalid_state("a live dialog", DialogState::Deleted));
        }
        self.profiles.add(name, value, dialog.uid())
    }

    pub fn unset_profile(&self, dialog: &Dialog, name: &str, value: Option<&str>) -> bool {
        self.profiles.remove(name, value, dialog.uid())
    }

    pub fn is_in_profile(&self, dialog: &Dialog, name: &str, value: Option<&str>) -> bool {
        self.profiles.contains(name, value, dialog.uid())
    }

    /// Dialogs in a profile, optionally restricted to one value
    pub fn profile_size(&self, name: &str, value: Option<&str>) -> DialogResult<usize> {
        self.profiles.size(name, value)
    }
}
