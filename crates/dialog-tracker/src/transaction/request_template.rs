//! In-dialog request templates
//!
//! Requests the tracker originates itself are described field by field and
//! handed to the transaction layer, which owns serialization and sending.

use serde::{Serialize, Deserialize};

use crate::dialog::{CalleeLeg, DialogSnapshot};
use crate::message::Method;

/// Which side of the dialog a generated request is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegSide {
    Caller,
    Callee,
}

/// Everything needed to build a request inside an established dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InDialogRequest {
    pub method: Method,
    pub side: LegSide,
    /// Remote target from the leg's Contact
    pub request_uri: String,
    pub route_set: Vec<String>,
    pub call_id: String,
    pub from_uri: String,
    pub from_tag: String,
    pub to_uri: String,
    pub to_tag: String,
    pub cseq: u32,
}

impl InDialogRequest {
    /// Build a request toward one side of `dialog`
    ///
    /// Toward the callee the answering leg is used. Returns `None` when the
    /// dialog has no answering leg or the target leg has no Contact.
    pub fn for_leg(dialog: &DialogSnapshot, method: Method, side: LegSide) -> Option<Self> {
        let callee: &CalleeLeg = dialog.confirmed_leg()?;
        let caller = &dialog.caller;
        let request = match side {
            LegSide::Callee => Self {
                method,
                side,
                request_uri: callee.contact.clone(),
                route_set: callee.route_set.clone(),
                call_id: dialog.call_id.clone(),
                from_uri: caller.uri.clone(),
                from_tag: caller.tag.clone(),
                to_uri: callee.uri.clone(),
                to_tag: callee.to_tag.clone(),
                cseq: caller.cseq.wrapping_add(1),
            },
            LegSide::Caller => Self {
                method,
                side,
                request_uri: caller.contact.clone(),
                route_set: caller.route_set.clone(),
                call_id: dialog.call_id.clone(),
                from_uri: callee.uri.clone(),
                from_tag: callee.to_tag.clone(),
                to_uri: caller.uri.clone(),
                to_tag: caller.tag.clone(),
                cseq: callee.cseq.wrapping_add(1),
            },
        };
        (!request.request_uri.is_empty()).then_some(request)
    }

    /// BYE toward both sides, skipping sides that cannot be reached
    pub fn bye_both(dialog: &DialogSnapshot) -> Vec<Self> {
        [LegSide::Caller, LegSide::Callee]
            .into_iter()
            .filter_map(|side| Self::for_leg(dialog, Method::Bye, side))
            .collect()
    }
}
