//! Dialog expiration and stale cleanup

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::core::DialogManager;
use super::transitions::EventContext;
use crate::dialog::{Dialog, DialogState};
use crate::state_machine::StateEvent;

/// Work done by one [`DialogManager::clean_stale`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Unanswered dialogs destroyed
    pub destroyed: usize,
    /// Unacknowledged dialogs whose timer was shortened
    pub shortened: usize,
}

impl DialogManager {
    /// Expire every dialog whose timer is due at `now`
    ///
    /// Returns the number of dialogs that expired.
    pub fn on_timer_tick(&self, now: Instant) -> usize {
        let due = self.timer.expire(now);
        if due.is_empty() {
            return 0;
        }
        debug!("{} dialog timer(s) due", due.len());
        due.into_iter().filter(|dialog| self.expire_dialog(dialog)).count()
    }

    /// Handle one expired timer entry; the entry's reference is `dialog`
    fn expire_dialog(&self, dialog: &Arc<Dialog>) -> bool {
        match self.drive(dialog, StateEvent::Timeout, EventContext::internal()) {
            Ok(step) if step.transition.is_noop() => {
                debug!("timer fired for already deleted dialog {}", dialog.key());
                false
            }
            Ok(step) => {
                info!("dialog {} expired in state {}", step.snapshot.key, step.transition.from);
                true
            }
            Err(e) => {
                warn!("expiring dialog {}: {}", dialog.key(), e);
                true
            }
        }
    }

    /// Reap dialogs stuck in setup and nudge unacknowledged ones
    ///
    /// Unconfirmed dialogs older than `unconfirmed_max_age` are destroyed
    /// with FAILED callbacks. Dialogs answered more than
    /// `confirmed_na_max_age` ago without an ACK get their timer cut to
    /// `confirmed_na_grace`.
    pub fn clean_stale(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();
        let unconfirmed_max_age = chrono::Duration::seconds(i64::from(self.config.unconfirmed_max_age));
        let confirmed_na_max_age = chrono::Duration::seconds(i64::from(self.config.confirmed_na_max_age));
        let grace = Duration::from_secs(u64::from(self.config.confirmed_na_grace));

        for dialog in self.table.dialogs() {
            let inner = dialog.lock();
            let state = inner.state;
            match state {
                DialogState::Unconfirmed if now - inner.init_ts > unconfirmed_max_age => {
                    drop(inner);
                    let unbound = self.unbind_dialog(&dialog);
                    debug!("reaping stale dialog {} ({} binding(s))", dialog.key(), unbound);
                    match self.drive(&dialog, StateEvent::TransactionDestroyed, EventContext::internal()) {
                        Ok(step) if step.transition.to == DialogState::Deleted => report.destroyed += 1,
                        Ok(_) => {}
                        Err(e) => warn!("reaping dialog {}: {}", dialog.key(), e),
                    }
                }
                DialogState::ConfirmedNa => {
                    let stale = inner.start_ts.is_some_and(|start| now - start > confirmed_na_max_age);
                    let remaining = self
                        .timer
                        .deadline(&dialog)
                        .map(|deadline| deadline.saturating_duration_since(Instant::now()));
                    if stale && remaining.is_none_or(|remaining| remaining > grace) {
                        self.timer.rearm(&dialog, grace);
                        report.shortened += 1;
                        debug!("dialog {} never acknowledged, expiring in {:?}", dialog.key(), grace);
                    }
                }
                _ => {}
            }
        }

        if report != CleanupReport::default() {
            info!(
                "stale cleanup: {} destroyed, {} shortened",
                report.destroyed, report.shortened
            );
        }
        report
    }
}
