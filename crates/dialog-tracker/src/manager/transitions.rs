//! Applying state machine transitions
//!
//! [`DialogManager::drive`] is the single place where a dialog changes
//! state. It runs [`next_state`] under the dialog lock, applies record and
//! timer effects while still holding it, and performs everything that may
//! take other locks or call user code (table unlink, concurrent spawn,
//! persistence, callbacks, events) after releasing it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::core::DialogManager;
use crate::dialog::{CalleeLeg, ConcurrentLink, Dialog, DialogFlags, DialogInner, DialogKey, DialogSnapshot, DialogState};
use crate::errors::{DialogError, DialogResult};
use crate::events::{CallbackKind, DialogEvent};
use crate::message::{SipMessage, present};
use crate::persistence::PersistenceMode;
use crate::routing::Direction;
use crate::state_machine::{next_state, BranchContext, Outcome, StateEvent, Transition};
use crate::transaction::InDialogRequest;

/// Message and direction an event was derived from
#[derive(Clone, Copy)]
pub(crate) struct EventContext<'a> {
    pub message: Option<&'a dyn SipMessage>,
    pub direction: Direction,
    /// Final response relayed upstream by the transaction layer
    pub relayed: bool,
}

impl<'a> EventContext<'a> {
    pub fn message(message: &'a dyn SipMessage, direction: Direction) -> Self {
        Self { message: Some(message), direction, relayed: false }
    }

    pub fn relayed(message: &'a dyn SipMessage, direction: Direction) -> Self {
        Self { relayed: true, ..Self::message(message, direction) }
    }

    /// Timer and administrative events
    pub fn internal() -> Self {
        Self { message: None, direction: Direction::None, relayed: false }
    }
}

/// Result of [`DialogManager::drive`]
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub transition: Transition,
    /// Dialog as left by the transition
    pub snapshot: DialogSnapshot,
}

/// Work deferred until the dialog lock is released
struct Deferred {
    spawn: Option<PendingSpawn>,
    send_byes: bool,
}

/// Leg moved out of a dialog for a concurrently confirmed sibling
struct PendingSpawn {
    child: DialogInner,
}

impl DialogManager {
    /// Run one state machine step for `dialog`
    pub(crate) fn drive(
        &self,
        dialog: &Arc<Dialog>,
        event: StateEvent,
        ctx: EventContext<'_>,
    ) -> DialogResult<Step> {
        let response_tag = ctx
            .message
            .filter(|msg| !msg.is_request())
            .and_then(|msg| present(msg.to_tag()));

        let mut deferred = Deferred { spawn: None, send_byes: false };
        let (transition, snapshot) = {
            let mut inner = dialog.lock();
            let branch = BranchContext {
                to_tag: response_tag,
                confirmed_leg: response_tag.is_some() && inner.confirmed_tag.as_deref() == response_tag,
                concurrent_leg: response_tag.is_some_and(|tag| inner.is_concurrent_tag(tag)),
                relayed: ctx.relayed,
            };
            let transition = next_state(inner.state, event, branch);

            if transition.is_noop() {
                debug!(
                    "dialog {} ignores {} in state {}",
                    dialog.key(), event, inner.state
                );
                let snapshot = DialogSnapshot::capture(dialog, &inner);
                return Ok(Step { transition, snapshot });
            }

            if let Some(msg) = ctx.message {
                if msg.is_request() {
                    update_cseq(&mut inner, msg, ctx.direction);
                }
            }
            self.apply_record_effects(dialog, &mut inner, &transition, ctx, response_tag, &mut deferred);
            self.apply_timer_effects(dialog, &inner, &transition);

            inner.state = transition.to;
            if transition.state_changed() {
                inner.mark_changed();
            }
            (transition, DialogSnapshot::capture(dialog, &inner))
        };

        debug!(
            "dialog {} {} -> {} on {} (unref {})",
            dialog.key(), transition.from, transition.to, event, transition.unref
        );

        let mut result = Ok(());
        if transition.effects.unlink {
            if self.table.remove(dialog) {
                self.profiles.remove_dialog(dialog.uid());
            } else {
                error!("dialog {} was already unlinked", dialog.key());
                result = Err(DialogError::internal(format!("dialog {} unlinked twice", dialog.key())));
            }
        }

        if deferred.send_byes {
            self.send_byes(&snapshot);
        }

        if let Some(spawn) = deferred.spawn.take() {
            self.spawn_concurrent(dialog, spawn, ctx);
        }

        self.persist(&transition, &snapshot);
        self.stats.record(&transition);

        if let Some(outcome) = transition.outcome {
            // the sibling gets its own callbacks when spawned
            if outcome != Outcome::ConcurrentlyConfirmed {
                self.callbacks
                    .run(CallbackKind::for_outcome(outcome), &snapshot, ctx.message, ctx.direction);
            }
        }

        if transition.state_changed() {
            self.events.publish(DialogEvent::StateChanged {
                key: snapshot.key,
                old_state: transition.from,
                new_state: transition.to,
            });
        }
        if transition.to == DialogState::Deleted {
            if let Some(outcome) = transition.outcome {
                info!("dialog {} ended: {:?}", snapshot.key, outcome);
                self.events.publish(DialogEvent::Terminated {
                    key: snapshot.key,
                    reason: format!("{outcome:?}"),
                });
            }
        }

        result.map(|()| Step { transition, snapshot })
    }

    fn apply_record_effects(
        &self,
        dialog: &Arc<Dialog>,
        inner: &mut DialogInner,
        transition: &Transition,
        ctx: EventContext<'_>,
        response_tag: Option<&str>,
        deferred: &mut Deferred,
    ) {
        let effects = transition.effects;

        if effects.record_leg {
            if let (Some(msg), Some(tag)) = (ctx.message, response_tag) {
                match inner.callee_mut(tag) {
                    Some(leg) => leg.update_from_response(msg),
                    None => {
                        let caller_cseq = inner.caller.cseq;
                        inner.callees.push(CalleeLeg::from_response(msg, tag, caller_cseq));
                    }
                }
            }
        }

        if effects.confirm_leg {
            if let Some(tag) = response_tag {
                inner.confirmed_tag = Some(tag.to_string());
                inner.start_ts = Some(Utc::now());
                for leg in inner.callees.iter_mut().filter(|leg| leg.to_tag != tag) {
                    leg.deleted = true;
                }
            }
        }

        if effects.mark_leg_deleted {
            if let Some(tag) = response_tag {
                if let Some(leg) = inner.callee_mut(tag) {
                    leg.deleted = true;
                }
            }
        }

        if effects.spawn_concurrent {
            if let Some(tag) = response_tag {
                deferred.spawn = self.prepare_spawn(dialog, inner, tag);
            }
        }

        match transition.outcome {
            Some(Outcome::Expired) => {
                inner.flags.insert(DialogFlags::EXPIRED);
                deferred.send_byes = self.config.bye_on_timeout
                    && transition.from.is_confirmed()
                    && inner.flags.contains(DialogFlags::TO_BYE);
            }
            Some(Outcome::Terminated) => {
                inner.flags.insert(DialogFlags::HAS_BYE);
                match ctx.direction {
                    Direction::Downstream => inner.flags.insert(DialogFlags::CALLER_BYE),
                    Direction::Upstream => inner.flags.insert(DialogFlags::CALLEE_BYE),
                    Direction::None => {}
                }
            }
            _ => {}
        }
    }

    /// Timer operations, run under the dialog lock
    fn apply_timer_effects(&self, dialog: &Arc<Dialog>, inner: &DialogInner, transition: &Transition) {
        let effects = transition.effects;
        if effects.arm_no_answer_timer && inner.no_answer_timeout > 0 {
            self.timer.arm(dialog, Duration::from_secs(u64::from(inner.no_answer_timeout)));
        }
        if effects.arm_lifetime_timer || effects.refresh_timer {
            self.timer.rearm(dialog, Duration::from_secs(u64::from(inner.lifetime)));
        }
        if effects.disarm_timer && !self.timer.disarm(dialog) && transition.event != StateEvent::Timeout {
            // the wheel may have taken the entry an instant ago
            debug!("dialog {} had no armed timer", dialog.key());
        }
    }

    /// Take the answering leg out of `inner` and build the sibling's record
    fn prepare_spawn(&self, dialog: &Arc<Dialog>, inner: &mut DialogInner, tag: &str) -> Option<PendingSpawn> {
        let position = inner.callees.iter().position(|leg| leg.to_tag == tag)?;
        let mut leg = inner.callees.remove(position);
        leg.deleted = false;

        let did = format!("{}{}", inner.did, "x".repeat(inner.concurrent.len() + 1));
        inner.concurrent.push(ConcurrentLink {
            to_tag: tag.to_string(),
            key: DialogKey::new(dialog.entry(), 0),
            did: did.clone(),
        });

        let now = Utc::now();
        let mut child = DialogInner::new(inner.caller.clone(), &inner.req_uri, inner.lifetime, inner.no_answer_timeout);
        child.did = did;
        child.state = DialogState::ConfirmedNa;
        child.flags = DialogFlags::NEW | DialogFlags::CHANGED;
        if inner.flags.contains(DialogFlags::TO_BYE) {
            child.flags.insert(DialogFlags::TO_BYE);
        }
        child.start_ts = Some(now);
        child.confirmed_tag = Some(leg.to_tag.clone());
        child.callees.push(leg);
        child.parent = Some(dialog.key());
        child.vars = inner.vars.clone();
        Some(PendingSpawn { child })
    }

    /// Link the sibling built by [`prepare_spawn`](Self::prepare_spawn)
    fn spawn_concurrent(&self, parent: &Arc<Dialog>, spawn: PendingSpawn, ctx: EventContext<'_>) {
        let PendingSpawn { child } = spawn;
        let tag = child.confirmed_tag.clone().unwrap_or_default();
        let lifetime = Duration::from_secs(u64::from(child.lifetime));

        let sibling = Arc::new(Dialog::new(parent.call_id(), parent.from_tag(), parent.entry(), child));
        self.timer.arm(&sibling, lifetime);
        let key = self.table.insert(&sibling);

        {
            let mut inner = parent.lock();
            if let Some(link) = inner.concurrent.iter_mut().find(|link| link.to_tag == tag) {
                link.key = key;
            }
        }

        let snapshot = sibling.snapshot();
        info!(
            "leg {} answered dialog {} concurrently, spawned {} ({})",
            tag, parent.key(), key, snapshot.did
        );
        self.stats.record_spawn();
        if self.config.persistence_mode == PersistenceMode::Realtime {
            self.flush(&snapshot);
        }
        self.callbacks.run(CallbackKind::ConfirmedNa, &snapshot, ctx.message, ctx.direction);
        self.events.publish(DialogEvent::ConcurrentSpawned { parent: parent.key(), key });
    }

    /// Send BYE to every confirmed leg of an expired or terminated dialog
    pub(crate) fn send_byes(&self, snapshot: &DialogSnapshot) -> usize {
        let requests = InDialogRequest::bye_both(snapshot);
        if requests.is_empty() {
            warn!("dialog {} has no confirmed leg to send BYE to", snapshot.key);
        }
        let mut sent = 0;
        for request in requests {
            let side = request.side;
            match self.transaction_layer.send_request(request) {
                Ok(()) => sent += 1,
                Err(e) => warn!("failed to send BYE to {:?} of dialog {}: {:#}", side, snapshot.key, e),
            }
        }
        sent
    }

    fn persist(&self, transition: &Transition, snapshot: &DialogSnapshot) {
        match self.config.persistence_mode {
            PersistenceMode::None => {}
            _ if transition.to == DialogState::Deleted && transition.from.is_confirmed() => self.forget(snapshot),
            PersistenceMode::Realtime if transition.effects.persist => {
                self.flush(snapshot);
            }
            _ => {}
        }
    }

    pub(crate) fn flush(&self, snapshot: &DialogSnapshot) -> bool {
        let Some(persistence) = &self.persistence else {
            return false;
        };
        match persistence.flush(snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", DialogError::persistence(e.context(format!("flushing dialog {}", snapshot.key))));
                false
            }
        }
    }

    fn forget(&self, snapshot: &DialogSnapshot) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.remove(snapshot) {
                warn!("{}", DialogError::persistence(e.context(format!("removing dialog {}", snapshot.key))));
            }
        }
    }
}

/// Track the highest CSeq seen from each side
fn update_cseq(inner: &mut DialogInner, msg: &dyn SipMessage, direction: Direction) {
    let Some(cseq) = msg.cseq() else {
        return;
    };
    match direction {
        Direction::Downstream => {
            if cseq > inner.caller.cseq {
                inner.caller.cseq = cseq;
            }
        }
        Direction::Upstream => {
            let Some(tag) = present(msg.from_tag()) else {
                return;
            };
            if let Some(leg) = inner.callee_mut(tag) {
                if cseq > leg.cseq {
                    leg.cseq = cseq;
                }
            }
        }
        Direction::None => {}
    }
}
