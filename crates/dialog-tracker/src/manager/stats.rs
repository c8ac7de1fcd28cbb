//! Dialog counters

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Serialize, Deserialize};

use crate::dialog::DialogState;
use crate::state_machine::{Outcome, Transition};

/// Running counters, updated lock-free
#[derive(Debug, Default)]
pub struct DialogStats {
    processed: AtomicU64,
    early: AtomicI64,
    active: AtomicI64,
    confirmed: AtomicU64,
    failed: AtomicU64,
    terminated: AtomicU64,
    expired: AtomicU64,
    spiraled: AtomicU64,
    concurrent: AtomicU64,
}

/// Point-in-time copy of [`DialogStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Dialogs created by initial requests
    pub processed: u64,
    /// Dialogs currently in early state
    pub early: u64,
    /// Confirmed dialogs not yet ended
    pub active: u64,
    pub confirmed: u64,
    pub failed: u64,
    pub terminated: u64,
    pub expired: u64,
    pub spiraled: u64,
    /// Sibling dialogs spawned for concurrent answers
    pub concurrent: u64,
}

impl DialogStats {
    pub(crate) fn record_created(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spiral(&self) {
        self.spiraled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spawn(&self) {
        self.concurrent.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for one applied transition
    pub(crate) fn record(&self, transition: &Transition) {
        if transition.to == DialogState::Early && transition.from != DialogState::Early {
            self.early.fetch_add(1, Ordering::Relaxed);
        }
        if transition.from == DialogState::Early && transition.to != DialogState::Early {
            self.early.fetch_sub(1, Ordering::Relaxed);
        }
        if transition.to.is_confirmed() && !transition.from.is_confirmed() {
            self.active.fetch_add(1, Ordering::Relaxed);
        }
        if transition.from.is_confirmed() && transition.to == DialogState::Deleted {
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
        match transition.outcome {
            Some(Outcome::Confirmed) => {
                self.confirmed.fetch_add(1, Ordering::Relaxed);
            }
            Some(Outcome::Failed | Outcome::Cancelled) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Some(Outcome::Terminated) => {
                self.terminated.fetch_add(1, Ordering::Relaxed);
            }
            Some(Outcome::Expired) => {
                self.expired.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let gauge = |value: &AtomicI64| value.load(Ordering::Relaxed).max(0) as u64;
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            early: gauge(&self.early),
            active: gauge(&self.active),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            spiraled: self.spiraled.load(Ordering::Relaxed),
            concurrent: self.concurrent.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{next_state, BranchContext, StateEvent};

    #[test]
    fn test_gauges_follow_the_lifecycle() {
        let stats = DialogStats::default();
        let tagged = BranchContext { to_tag: Some("t1"), ..Default::default() };

        stats.record(&next_state(DialogState::Unconfirmed, StateEvent::Rpl1xx, tagged));
        assert_eq!(stats.snapshot().early, 1);

        stats.record(&next_state(DialogState::Early, StateEvent::Rpl2xx, tagged));
        let snap = stats.snapshot();
        assert_eq!(snap.early, 0);
        assert_eq!(snap.active, 1);

        stats.record(&next_state(DialogState::ConfirmedNa, StateEvent::ReqAck, tagged));
        stats.record(&next_state(DialogState::Confirmed, StateEvent::ReqBye, BranchContext::default()));
        let snap = stats.snapshot();
        assert_eq!(snap.active, 0);
        assert_eq!(snap.confirmed, 1);
        assert_eq!(snap.terminated, 1);
    }

    #[test]
    fn test_failed_setup() {
        let stats = DialogStats::default();
        stats.record(&next_state(DialogState::Unconfirmed, StateEvent::ReqCancel, BranchContext::default()));
        stats.record(&next_state(DialogState::Early, StateEvent::Timeout, BranchContext::default()));
        let snap = stats.snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.expired, 1);
        assert_eq!(snap.early, 0);
        assert_eq!(snap.active, 0);
    }
}
