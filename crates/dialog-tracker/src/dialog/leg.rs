//! Caller and callee legs
//!
//! A dialog has exactly one caller leg, filled from the initial request,
//! and zero or more callee legs, one per To-tag seen in responses. Forked
//! INVITEs produce several callee legs until one answers.

use std::net::SocketAddr;
use serde::{Serialize, Deserialize};

use crate::message::SipMessage;

/// Signaling state of the side that sent the initial request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerLeg {
    /// From-tag of the initial request
    pub tag: String,
    /// From URI
    pub uri: String,
    /// Contact of the caller, target for upstream requests
    pub contact: String,
    /// Highest CSeq seen from the caller
    pub cseq: u32,
    /// Record-Route set as seen on the initial request
    pub route_set: Vec<String>,
    /// Socket the initial request arrived on
    pub bind_addr: Option<SocketAddr>,
}

impl CallerLeg {
    /// Build the caller leg from an initial request
    pub(crate) fn from_request<M: SipMessage + ?Sized>(
        msg: &M,
        tag: &str,
        cseq: u32,
        contact: &str,
    ) -> Self {
        Self {
            tag: tag.to_string(),
            uri: msg.from_uri().unwrap_or_default().to_string(),
            contact: contact.to_string(),
            cseq,
            route_set: msg.record_route().to_vec(),
            bind_addr: msg.received_on(),
        }
    }
}

/// Signaling state of one answering (or ringing) branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalleeLeg {
    /// To-tag, unique within the dialog
    pub to_tag: String,
    /// To URI
    pub uri: String,
    /// Contact of the callee, target for downstream requests
    pub contact: String,
    /// Highest CSeq seen from the callee
    pub cseq: u32,
    /// CSeq the caller used on this branch
    pub caller_cseq: u32,
    /// Record-Route set from the response, reversed for downstream use
    pub route_set: Vec<String>,
    /// Branch that produced the leg
    pub branch: String,
    /// Socket the response arrived on
    pub bind_addr: Option<SocketAddr>,
    /// Branch lost the race and is kept only to absorb late requests
    pub deleted: bool,
}

impl CalleeLeg {
    /// Build a callee leg from a response carrying a To-tag
    pub(crate) fn from_response<M: SipMessage + ?Sized>(msg: &M, to_tag: &str, caller_cseq: u32) -> Self {
        let mut leg = Self {
            to_tag: to_tag.to_string(),
            uri: msg.to_uri().unwrap_or_default().to_string(),
            contact: String::new(),
            cseq: 0,
            caller_cseq,
            route_set: Vec::new(),
            branch: msg.branch().unwrap_or_default().to_string(),
            bind_addr: msg.received_on(),
            deleted: false,
        };
        leg.update_from_response(msg);
        leg
    }

    /// Refresh Contact and Record-Route from a later response on the same branch
    pub(crate) fn update_from_response<M: SipMessage + ?Sized>(&mut self, msg: &M) {
        if let Some(contact) = msg.contact() {
            self.contact = contact.to_string();
        }
        let route_set = msg.record_route();
        if !route_set.is_empty() {
            self.route_set = route_set.iter().rev().cloned().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SimpleMessage;

    #[test]
    fn test_callee_leg_reverses_route_set() {
        let response = SimpleMessage::response(180, "abc")
            .with_to("sip:bob@example.com", Some("t1"))
            .with_contact("sip:bob@10.0.0.2")
            .with_record_route("<sip:p1;lr>")
            .with_record_route("<sip:p2;lr>")
            .with_branch("z9hG4bK1");

        let leg = CalleeLeg::from_response(&response, "t1", 1);
        assert_eq!(leg.route_set, vec!["<sip:p2;lr>".to_string(), "<sip:p1;lr>".to_string()]);
        assert_eq!(leg.contact, "sip:bob@10.0.0.2");
        assert_eq!(leg.branch, "z9hG4bK1");
        assert!(!leg.deleted);
    }

    #[test]
    fn test_update_keeps_contact_when_absent() {
        let first = SimpleMessage::response(180, "abc")
            .with_to("sip:bob@example.com", Some("t1"))
            .with_contact("sip:bob@10.0.0.2");
        let mut leg = CalleeLeg::from_response(&first, "t1", 1);

        let second = SimpleMessage::response(200, "abc").with_to("sip:bob@example.com", Some("t1"));
        leg.update_from_response(&second);
        assert_eq!(leg.contact, "sip:bob@10.0.0.2");
    }
}
