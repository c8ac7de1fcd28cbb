//! Dialog bound to the message a worker is processing
//!
//! Routing logic often asks about "the dialog of this message" several
//! times while handling one request. The binding is per thread and keyed by
//! [`SipMessage::message_id`], so a stale binding from a previous message is
//! never returned. It holds a weak reference: a dialog that ended while its
//! message was processed is freed without waiting for the worker's next
//! message.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use crate::dialog::Dialog;

struct CurrentDialog {
    message_id: u64,
    dialog: Weak<Dialog>,
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentDialog>> = const { RefCell::new(None) };
}

pub(crate) fn set_current(message_id: u64, dialog: &Arc<Dialog>) {
    CURRENT.with(|current| {
        *current.borrow_mut() = Some(CurrentDialog { message_id, dialog: Arc::downgrade(dialog) });
    });
}

pub(crate) fn current_for(message_id: u64) -> Option<Arc<Dialog>> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .filter(|bound| bound.message_id == message_id)
            .and_then(|bound| bound.dialog.upgrade())
    })
}

/// Forget this thread's binding
pub fn clear_current_dialog() {
    CURRENT.with(|current| current.borrow_mut().take());
}
