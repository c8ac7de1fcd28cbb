//! Deadline-ordered dialog timer
//!
//! One entry per dialog, ordered by deadline. An armed entry holds a strong
//! reference to its dialog; [`DialogTimer::expire`] hands that reference to
//! the caller, so a dialog cannot be freed while its expiration is being
//! handled even if it is disarmed concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::dialog::Dialog;

#[derive(Debug, Default)]
struct TimerInner {
    /// `(deadline, sequence)` → dialog
    queue: BTreeMap<(Instant, u64), Arc<Dialog>>,
    /// dialog uid → queue key
    index: HashMap<u64, (Instant, u64)>,
    seq: u64,
}

impl TimerInner {
    fn insert(&mut self, dialog: &Arc<Dialog>, deadline: Instant) {
        self.seq += 1;
        let key = (deadline, self.seq);
        self.queue.insert(key, dialog.clone());
        self.index.insert(dialog.uid(), key);
    }

    fn remove(&mut self, uid: u64) -> Option<Arc<Dialog>> {
        let key = self.index.remove(&uid)?;
        self.queue.remove(&key)
    }
}

/// Timer entries for all dialogs with a pending expiration
#[derive(Debug, Default)]
pub struct DialogTimer {
    inner: Mutex<TimerInner>,
}

impl DialogTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer `timeout` from now; false if one is already armed
    pub fn arm(&self, dialog: &Arc<Dialog>, timeout: Duration) -> bool {
        self.arm_at(dialog, Instant::now() + timeout)
    }

    /// Arm a timer at `deadline`; false if one is already armed
    pub fn arm_at(&self, dialog: &Arc<Dialog>, deadline: Instant) -> bool {
        let mut inner = self.inner.lock();
        if inner.index.contains_key(&dialog.uid()) {
            return false;
        }
        inner.insert(dialog, deadline);
        trace!("armed timer for dialog uid={}", dialog.uid());
        true
    }

    /// Replace any pending entry with one `timeout` from now
    ///
    /// Returns whether an entry was replaced.
    pub fn rearm(&self, dialog: &Arc<Dialog>, timeout: Duration) -> bool {
        self.rearm_at(dialog, Instant::now() + timeout)
    }

    /// Replace any pending entry with one at `deadline`
    pub fn rearm_at(&self, dialog: &Arc<Dialog>, deadline: Instant) -> bool {
        let mut inner = self.inner.lock();
        let replaced = inner.remove(dialog.uid()).is_some();
        inner.insert(dialog, deadline);
        trace!("rearmed timer for dialog uid={} (replaced={})", dialog.uid(), replaced);
        replaced
    }

    /// Remove the pending entry, releasing its reference
    ///
    /// Returns false if nothing was armed, which includes the case where
    /// the entry has already been taken by [`expire`](Self::expire).
    pub fn disarm(&self, dialog: &Dialog) -> bool {
        self.inner.lock().remove(dialog.uid()).is_some()
    }

    pub fn deadline(&self, dialog: &Dialog) -> Option<Instant> {
        self.inner.lock().index.get(&dialog.uid()).map(|(deadline, _)| *deadline)
    }

    pub fn is_armed(&self, dialog: &Dialog) -> bool {
        self.inner.lock().index.contains_key(&dialog.uid())
    }

    /// Number of armed entries
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every entry due at or before `now`, earliest first
    pub fn expire(&self, now: Instant) -> Vec<Arc<Dialog>> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while let Some(entry) = inner.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let dialog = entry.remove();
            inner.index.remove(&dialog.uid());
            due.push(dialog);
        }
        due
    }
}
