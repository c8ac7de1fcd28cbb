//! Dialog state machine
//!
//! [`next_state`] is a pure function of the current state, the event and
//! what the caller knows about the branch the event concerns. It performs
//! no I/O and touches no shared state; the manager applies the returned
//! [`Effects`] while holding the dialog lock (record changes, timer) or
//! right after releasing it (table unlink, callbacks, persistence).
//!
//! ## Transition table
//!
//! ```text
//! Unconfirmed ──1xx+tag──▶ Early ──2xx──▶ ConfirmedNa ──ACK──▶ Confirmed
//!      │                    │                  │                  │
//!      │ 2xx ───────────────┼──────────────────┘                  │ 2xx, other leg
//!      │                    │                                     ▼
//!      ├─3xx/TDEL/CANCEL────┴──▶ Deleted ◀──BYE/timeout──  ConcurrentlyConfirmed
//! ```
//!
//! A 3xx+ deletes the dialog only when it is the final response relayed
//! upstream ([`BranchContext::relayed`]). A failure reported by a single
//! fork branch marks that branch's leg deleted and leaves the others free
//! to answer.
//!
//! Events that make no sense in a state (BYE before any answer, a late
//! 1xx after confirmation) are no-ops: the state is left untouched and the
//! caller carries on with normal message processing.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::dialog::DialogState;
use crate::message::Method;

/// Event driving a dialog transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateEvent {
    /// Any other in-dialog request
    Req,
    ReqAck,
    ReqBye,
    ReqCancel,
    ReqPrack,
    Rpl1xx,
    Rpl2xx,
    /// Final negative response (3xx and above)
    Rpl3xx,
    /// The transaction that created the dialog is gone
    TransactionDestroyed,
    /// Dialog timer fired
    Timeout,
}

impl StateEvent {
    /// Event for an in-dialog request
    pub fn from_method(method: &Method) -> Self {
        match method {
            Method::Ack => StateEvent::ReqAck,
            Method::Bye => StateEvent::ReqBye,
            Method::Cancel => StateEvent::ReqCancel,
            Method::Prack => StateEvent::ReqPrack,
            _ => StateEvent::Req,
        }
    }

    /// Event for a response class, `None` for codes below 100
    pub fn from_status(code: u16) -> Option<Self> {
        match code {
            100..=199 => Some(StateEvent::Rpl1xx),
            200..=299 => Some(StateEvent::Rpl2xx),
            300.. => Some(StateEvent::Rpl3xx),
            _ => None,
        }
    }
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateEvent::Req => "REQ",
            StateEvent::ReqAck => "REQACK",
            StateEvent::ReqBye => "REQBYE",
            StateEvent::ReqCancel => "REQCANCEL",
            StateEvent::ReqPrack => "REQPRACK",
            StateEvent::Rpl1xx => "RPL1xx",
            StateEvent::Rpl2xx => "RPL2xx",
            StateEvent::Rpl3xx => "RPL3xx",
            StateEvent::TransactionDestroyed => "TDEL",
            StateEvent::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// What the caller knows about the branch an event concerns
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchContext<'a> {
    /// To-tag carried by the response, if any
    pub to_tag: Option<&'a str>,
    /// The To-tag belongs to the answering leg
    pub confirmed_leg: bool,
    /// The To-tag was already handed to a concurrently confirmed sibling
    pub concurrent_leg: bool,
    /// The response is the final one relayed upstream once every branch
    /// has completed, not a single branch's answer
    pub relayed: bool,
}

/// Terminal or milestone result of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Early,
    ConfirmedNa,
    Confirmed,
    /// Another leg answered; a sibling dialog must be spawned
    ConcurrentlyConfirmed,
    /// Setup never completed
    Failed,
    Cancelled,
    Terminated,
    Expired,
}

/// Side effects the manager must apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    /// Create or refresh the callee leg for the To-tag
    pub record_leg: bool,
    /// Make the To-tag the answering leg, marking the others deleted
    pub confirm_leg: bool,
    /// Mark the callee leg for the To-tag deleted
    pub mark_leg_deleted: bool,
    /// Arm the no-answer timer
    pub arm_no_answer_timer: bool,
    /// Arm or rearm the timer with the dialog lifetime
    pub arm_lifetime_timer: bool,
    /// Push the deadline out by the dialog lifetime
    pub refresh_timer: bool,
    pub disarm_timer: bool,
    /// Remove the dialog from the table
    pub unlink: bool,
    /// Move the To-tag's leg to a new sibling dialog
    pub spawn_concurrent: bool,
    /// Flush the dialog to persistence
    pub persist: bool,
}

/// Result of one state machine step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub event: StateEvent,
    pub from: DialogState,
    pub to: DialogState,
    /// Structural references released by the step, not counting the timer's
    pub unref: u32,
    pub outcome: Option<Outcome>,
    pub effects: Effects,
}

impl Transition {
    fn stay(state: DialogState, event: StateEvent) -> Self {
        Self {
            event,
            from: state,
            to: state,
            unref: 0,
            outcome: None,
            effects: Effects::default(),
        }
    }

    fn delete(state: DialogState, event: StateEvent, outcome: Outcome) -> Self {
        Self {
            to: DialogState::Deleted,
            unref: 1,
            outcome: Some(outcome),
            effects: Effects { disarm_timer: true, unlink: true, ..Effects::default() },
            ..Self::stay(state, event)
        }
    }

    /// Nothing changes
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.outcome.is_none() && self.effects == Effects::default()
    }

    pub fn state_changed(&self) -> bool {
        self.from != self.to
    }
}

/// Compute the transition for `event` in `state`
pub fn next_state(state: DialogState, event: StateEvent, branch: BranchContext<'_>) -> Transition {
    use DialogState::*;
    use StateEvent::*;

    let mut t = Transition::stay(state, event);

    // the reference held by the setup transaction goes away with it
    if event == TransactionDestroyed {
        t.unref = 1;
    }

    match (state, event) {
        (Deleted, _) => {}

        (_, Timeout) => t = Transition::delete(state, event, Outcome::Expired),

        (Unconfirmed | Early, Rpl1xx) => {
            if branch.to_tag.is_some() {
                t.to = Early;
                t.effects.record_leg = true;
                if state == Unconfirmed {
                    t.outcome = Some(Outcome::Early);
                    t.effects.arm_no_answer_timer = true;
                }
            }
        }

        (Unconfirmed | Early, Rpl2xx) => {
            if branch.to_tag.is_some() {
                t.to = ConfirmedNa;
                t.outcome = Some(Outcome::ConfirmedNa);
                t.effects = Effects {
                    record_leg: true,
                    confirm_leg: true,
                    arm_lifetime_timer: true,
                    persist: true,
                    ..Effects::default()
                };
            }
        }

        // a single branch failing only retires its own leg
        (Unconfirmed | Early, Rpl3xx) => {
            if branch.relayed {
                t = Transition::delete(state, event, Outcome::Failed);
            } else if branch.to_tag.is_some() {
                t.effects.mark_leg_deleted = true;
            }
        }

        (Unconfirmed | Early, TransactionDestroyed) => {
            t = Transition::delete(state, event, Outcome::Failed);
            t.unref += 1;
        }

        (Unconfirmed | Early, ReqCancel) => t = Transition::delete(state, event, Outcome::Cancelled),

        (ConfirmedNa, ReqAck) => {
            t.to = Confirmed;
            t.outcome = Some(Outcome::Confirmed);
            t.effects.persist = true;
        }

        (ConfirmedNa | Confirmed | ConcurrentlyConfirmed, ReqBye) => {
            t = Transition::delete(state, event, Outcome::Terminated);
            t.effects.persist = true;
        }

        (Confirmed | ConcurrentlyConfirmed, Req) => t.effects.refresh_timer = true,

        (ConfirmedNa | Confirmed | ConcurrentlyConfirmed, Rpl2xx) => {
            let new_leg = branch.to_tag.is_some() && !branch.confirmed_leg && !branch.concurrent_leg;
            if new_leg {
                if state != ConfirmedNa {
                    t.to = ConcurrentlyConfirmed;
                }
                t.outcome = Some(Outcome::ConcurrentlyConfirmed);
                t.effects.record_leg = true;
                t.effects.spawn_concurrent = true;
            }
        }

        // in-early-dialog requests, late responses, retransmissions
        _ => {}
    }

    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::dialog::DialogState::*;
    use super::StateEvent::*;

    fn tagged(tag: &str) -> BranchContext<'_> {
        BranchContext { to_tag: Some(tag), ..Default::default() }
    }

    #[test]
    fn test_happy_path() {
        let t = next_state(Unconfirmed, Rpl1xx, tagged("t1"));
        assert_eq!(t.to, Early);
        assert_eq!(t.outcome, Some(Outcome::Early));
        assert!(t.effects.arm_no_answer_timer);

        let t = next_state(Early, Rpl1xx, tagged("t1"));
        assert_eq!(t.to, Early);
        assert_eq!(t.outcome, None);
        assert!(!t.effects.arm_no_answer_timer);

        let t = next_state(Early, Rpl2xx, tagged("t1"));
        assert_eq!(t.to, ConfirmedNa);
        assert!(t.effects.arm_lifetime_timer && t.effects.persist && t.effects.confirm_leg);

        let t = next_state(ConfirmedNa, ReqAck, BranchContext::default());
        assert_eq!(t.to, Confirmed);
        assert!(!t.effects.refresh_timer);

        let t = next_state(Confirmed, ReqBye, BranchContext::default());
        assert_eq!(t.to, Deleted);
        assert_eq!(t.outcome, Some(Outcome::Terminated));
        assert!(t.effects.unlink && t.effects.disarm_timer);
        assert_eq!(t.unref, 1);
    }

    #[test]
    fn test_missing_to_tag_is_noop() {
        assert!(next_state(Unconfirmed, Rpl1xx, BranchContext::default()).is_noop());
        assert!(next_state(Early, Rpl2xx, BranchContext::default()).is_noop());
    }

    #[test]
    fn test_branch_failure_only_retires_its_leg() {
        let t = next_state(Early, Rpl3xx, tagged("t2"));
        assert_eq!(t.to, Early);
        assert_eq!(t.outcome, None);
        assert!(t.effects.mark_leg_deleted);
        assert!(!t.effects.unlink);

        assert!(next_state(Unconfirmed, Rpl3xx, BranchContext::default()).is_noop());

        let relayed = BranchContext { to_tag: Some("t2"), relayed: true, ..Default::default() };
        let t = next_state(Early, Rpl3xx, relayed);
        assert_eq!(t.to, Deleted);
        assert_eq!(t.outcome, Some(Outcome::Failed));

        let t = next_state(Unconfirmed, Rpl3xx, BranchContext { relayed: true, ..Default::default() });
        assert_eq!(t.to, Deleted);

        let t = next_state(ConfirmedNa, Rpl3xx, BranchContext { relayed: true, ..Default::default() });
        assert!(t.is_noop());
    }

    #[test]
    fn test_transaction_destroyed() {
        let t = next_state(Early, TransactionDestroyed, BranchContext::default());
        assert_eq!(t.to, Deleted);
        assert_eq!(t.unref, 2);

        let t = next_state(Confirmed, TransactionDestroyed, BranchContext::default());
        assert_eq!(t.to, Confirmed);
        assert_eq!(t.unref, 1);
        assert!(t.outcome.is_none());
    }

    #[test]
    fn test_cancel_only_before_answer() {
        assert_eq!(next_state(Early, ReqCancel, BranchContext::default()).outcome, Some(Outcome::Cancelled));
        assert!(next_state(Confirmed, ReqCancel, BranchContext::default()).is_noop());
    }

    #[test]
    fn test_bye_ignored_in_early() {
        assert!(next_state(Early, ReqBye, BranchContext::default()).is_noop());
        assert!(next_state(Unconfirmed, ReqAck, BranchContext::default()).is_noop());
    }

    #[test]
    fn test_concurrent_confirmation() {
        let confirmed = BranchContext { to_tag: Some("t1"), confirmed_leg: true, ..Default::default() };
        assert!(next_state(Confirmed, Rpl2xx, confirmed).is_noop());

        let t = next_state(Confirmed, Rpl2xx, tagged("t2"));
        assert_eq!(t.to, ConcurrentlyConfirmed);
        assert!(t.effects.spawn_concurrent);

        let t = next_state(ConfirmedNa, Rpl2xx, tagged("t2"));
        assert_eq!(t.to, ConfirmedNa);
        assert!(t.effects.spawn_concurrent);

        let spawned = BranchContext { to_tag: Some("t2"), concurrent_leg: true, ..Default::default() };
        assert!(next_state(ConcurrentlyConfirmed, Rpl2xx, spawned).is_noop());

        assert_eq!(next_state(ConcurrentlyConfirmed, ReqBye, BranchContext::default()).to, Deleted);
    }

    #[test]
    fn test_timeout_deletes_everything_but_deleted() {
        for state in [Unconfirmed, Early, ConfirmedNa, Confirmed, ConcurrentlyConfirmed] {
            let t = next_state(state, Timeout, BranchContext::default());
            assert_eq!(t.to, Deleted);
            assert_eq!(t.outcome, Some(Outcome::Expired));
        }
        assert!(next_state(Deleted, Timeout, BranchContext::default()).is_noop());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(StateEvent::from_status(99), None);
        assert_eq!(StateEvent::from_status(180), Some(Rpl1xx));
        assert_eq!(StateEvent::from_status(202), Some(Rpl2xx));
        assert_eq!(StateEvent::from_status(486), Some(Rpl3xx));
        assert_eq!(StateEvent::from_method(&Method::Update), Req);
    }

    fn any_event() -> impl Strategy<Value = StateEvent> {
        prop_oneof![
            Just(Req), Just(ReqAck), Just(ReqBye), Just(ReqCancel), Just(ReqPrack),
            Just(Rpl1xx), Just(Rpl2xx), Just(Rpl3xx), Just(TransactionDestroyed), Just(Timeout),
        ]
    }

    proptest! {
        #[test]
        fn prop_state_never_regresses(
            steps in proptest::collection::vec((any_event(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()), 0..40)
        ) {
            let mut state = Unconfirmed;
            for (event, has_tag, confirmed_leg, concurrent_leg, relayed) in steps {
                let ctx = BranchContext {
                    to_tag: has_tag.then_some("t"),
                    confirmed_leg,
                    concurrent_leg,
                    relayed,
                };
                let t = next_state(state, event, ctx);
                prop_assert!(t.to.rank() >= state.rank());
                if state == Deleted {
                    prop_assert_eq!(t.to, Deleted);
                }
                state = t.to;
            }
        }
    }
}
