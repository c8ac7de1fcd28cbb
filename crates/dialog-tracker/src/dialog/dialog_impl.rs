//! Dialog record
//!
//! A [`Dialog`] is shared as `Arc<Dialog>` between the dialog table, the
//! timer wheel, the transaction bindings and whichever worker is currently
//! handling a message for it. The identity fields (Call-ID, From-tag,
//! bucket) never change and are readable without locking; everything else
//! lives in [`DialogInner`] behind the per-dialog mutex.
//!
//! ## Lock ordering
//!
//! ```text
//! bucket lock  →  dialog lock  →  timer lock
//! ```
//!
//! A worker holding a dialog lock never takes a bucket lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Serialize, Deserialize};
use tracing::debug;

use super::dialog_id::DialogKey;
use super::dialog_state::DialogState;
use super::flags::{DialogFlags, ScriptFlags};
use super::leg::{CalleeLeg, CallerLeg};
use crate::routing::Direction;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// A dialog tracked by this server
#[derive(Debug)]
pub struct Dialog {
    uid: u64,
    call_id: String,
    from_tag: String,
    entry: u32,
    slot: AtomicU32,
    inner: Mutex<DialogInner>,
}

/// Mutable part of a dialog, guarded by the dialog lock
#[derive(Debug, Clone)]
pub struct DialogInner {
    /// Dialog-id used for fork correlation
    pub did: String,
    pub state: DialogState,
    pub flags: DialogFlags,
    pub script_flags: ScriptFlags,
    /// Lifetime in seconds once confirmed
    pub lifetime: u32,
    /// Seconds the dialog may stay in early state
    pub no_answer_timeout: u32,
    pub init_ts: DateTime<Utc>,
    /// Set when the dialog is confirmed
    pub start_ts: Option<DateTime<Utc>>,
    pub req_uri: String,
    pub caller: CallerLeg,
    pub callees: Vec<CalleeLeg>,
    /// To-tag of the answering leg
    pub confirmed_tag: Option<String>,
    /// Dialogs spawned for legs that answered after confirmation
    pub concurrent: Vec<ConcurrentLink>,
    /// Dialog this one was spawned from
    pub parent: Option<DialogKey>,
    pub vars: BTreeMap<String, String>,
}

/// Link from a dialog to a concurrently confirmed sibling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrentLink {
    pub to_tag: String,
    pub key: DialogKey,
    pub did: String,
}

impl Dialog {
    /// Create an unlinked dialog in bucket `entry`
    pub(crate) fn new(call_id: &str, from_tag: &str, entry: u32, inner: DialogInner) -> Self {
        Self {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            call_id: call_id.to_string(),
            from_tag: from_tag.to_string(),
            entry,
            slot: AtomicU32::new(0),
            inner: Mutex::new(inner),
        }
    }

    /// Process-unique id, independent of table placement
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn from_tag(&self) -> &str {
        &self.from_tag
    }

    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// Slot id, 0 until the dialog is linked
    pub fn slot(&self) -> u32 {
        self.slot.load(Ordering::Acquire)
    }

    pub(crate) fn assign_slot(&self, slot: u32) {
        self.slot.store(slot, Ordering::Release);
    }

    pub fn key(&self) -> DialogKey {
        DialogKey::new(self.entry, self.slot())
    }

    /// Take the dialog lock
    pub fn lock(&self) -> MutexGuard<'_, DialogInner> {
        self.inner.lock()
    }

    /// Current state, taking the lock briefly
    pub fn state(&self) -> DialogState {
        self.inner.lock().state
    }

    pub fn did(&self) -> String {
        self.inner.lock().did.clone()
    }

    /// Copy of the dialog for callbacks and administration
    pub fn snapshot(self: &Arc<Self>) -> DialogSnapshot {
        let inner = self.inner.lock();
        DialogSnapshot::capture(self, &inner)
    }

    /// Direction of a request carrying these tags, if it belongs to this dialog
    ///
    /// A missing To-tag only matches when `allow_missing_to_tag` is set and
    /// the From-tag is the caller's.
    pub(crate) fn direction_for(
        &self,
        inner: &DialogInner,
        from_tag: &str,
        to_tag: Option<&str>,
        allow_missing_to_tag: bool,
    ) -> Option<Direction> {
        match to_tag {
            None => (allow_missing_to_tag && from_tag == self.from_tag).then_some(Direction::Downstream),
            Some(to_tag) => {
                if from_tag == self.from_tag && inner.matching_leg(to_tag).is_some() {
                    Some(Direction::Downstream)
                } else if to_tag == self.from_tag && inner.matching_leg(from_tag).is_some() {
                    Some(Direction::Upstream)
                } else {
                    None
                }
            }
        }
    }
}

impl Drop for Dialog {
    fn drop(&mut self) {
        debug!("destroying dialog uid={} call_id={}", self.uid, self.call_id);
    }
}

impl DialogInner {
    /// Fresh state for a dialog created by an initial request
    pub(crate) fn new(caller: CallerLeg, req_uri: &str, lifetime: u32, no_answer_timeout: u32) -> Self {
        Self {
            did: String::new(),
            state: DialogState::Unconfirmed,
            flags: DialogFlags::NEW,
            script_flags: ScriptFlags::default(),
            lifetime,
            no_answer_timeout,
            init_ts: Utc::now(),
            start_ts: None,
            req_uri: req_uri.to_string(),
            caller,
            callees: Vec::new(),
            confirmed_tag: None,
            concurrent: Vec::new(),
            parent: None,
            vars: BTreeMap::new(),
        }
    }

    pub fn callee(&self, to_tag: &str) -> Option<&CalleeLeg> {
        self.callees.iter().find(|leg| leg.to_tag == to_tag)
    }

    pub fn callee_mut(&mut self, to_tag: &str) -> Option<&mut CalleeLeg> {
        self.callees.iter_mut().find(|leg| leg.to_tag == to_tag)
    }

    /// Callee leg an in-dialog request carrying `to_tag` belongs to
    ///
    /// Once a leg has answered only that leg matches. Before that, any leg
    /// whose branch has not failed does.
    pub fn matching_leg(&self, to_tag: &str) -> Option<&CalleeLeg> {
        match self.confirmed_tag.as_deref() {
            Some(confirmed) if confirmed != to_tag => None,
            _ => self.callee(to_tag).filter(|leg| !leg.deleted),
        }
    }

    /// To-tag already handed to a concurrently confirmed sibling
    pub fn is_concurrent_tag(&self, to_tag: &str) -> bool {
        self.concurrent.iter().any(|link| link.to_tag == to_tag)
    }

    /// Leg used for downstream routing
    pub fn downstream_leg(&self, to_tag: Option<&str>) -> Option<&CalleeLeg> {
        to_tag
            .and_then(|tag| self.callee(tag))
            .or_else(|| self.confirmed_tag.as_deref().and_then(|tag| self.callee(tag)))
    }

    pub(crate) fn mark_changed(&mut self) {
        self.flags.insert(DialogFlags::CHANGED);
    }
}

/// Immutable copy of a dialog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogSnapshot {
    pub key: DialogKey,
    pub did: String,
    pub call_id: String,
    pub from_tag: String,
    pub state: DialogState,
    pub flags: DialogFlags,
    pub script_flags: ScriptFlags,
    pub lifetime: u32,
    pub init_ts: DateTime<Utc>,
    pub start_ts: Option<DateTime<Utc>>,
    pub req_uri: String,
    pub caller: CallerLeg,
    pub callees: Vec<CalleeLeg>,
    pub confirmed_tag: Option<String>,
    pub concurrent: Vec<ConcurrentLink>,
    pub parent: Option<DialogKey>,
    pub vars: BTreeMap<String, String>,
    /// Strong references held when the snapshot was taken
    pub ref_count: usize,
}

impl DialogSnapshot {
    pub(crate) fn capture(dialog: &Arc<Dialog>, inner: &DialogInner) -> Self {
        Self {
            key: dialog.key(),
            did: inner.did.clone(),
            call_id: dialog.call_id.clone(),
            from_tag: dialog.from_tag.clone(),
            state: inner.state,
            flags: inner.flags,
            script_flags: inner.script_flags,
            lifetime: inner.lifetime,
            init_ts: inner.init_ts,
            start_ts: inner.start_ts,
            req_uri: inner.req_uri.clone(),
            caller: inner.caller.clone(),
            callees: inner.callees.clone(),
            confirmed_tag: inner.confirmed_tag.clone(),
            concurrent: inner.concurrent.clone(),
            parent: inner.parent,
            vars: inner.vars.clone(),
            ref_count: Arc::strong_count(dialog),
        }
    }

    /// The answering leg, if any
    pub fn confirmed_leg(&self) -> Option<&CalleeLeg> {
        let tag = self.confirmed_tag.as_deref()?;
        self.callees.iter().find(|leg| leg.to_tag == tag)
    }
}
