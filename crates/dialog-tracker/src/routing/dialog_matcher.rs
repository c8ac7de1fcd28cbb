//! Dialog matching for in-dialog requests
//!
//! Decides which dialog an inbound request belongs to and which way it is
//! travelling. Two lookups are available:
//!
//! - **Tight (ID) matching**: decode the route parameter this server placed
//!   in Record-Route and go straight to the table slot. The hit is only
//!   trusted after Call-ID and tags have been checked against the dialog.
//! - **Loose matching**: hash the Call-ID and compare `(From-tag, To-tag)`
//!   against the caller tag and every callee leg, in both orientations.
//!
//! ```text
//!           route param present?
//!             │yes          │no
//!             ▼             │
//!      decode + lookup_by_id│
//!             │             │
//!      Call-ID/tags match?  │
//!       │yes      │no       │
//!       ▼         └────┬────┘
//!    matched           ▼
//!              lookup_by_key (unless StrictId)
//! ```

use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use super::Direction;
use super::route_param;
use crate::dialog::{Dialog, DialogKey};
use crate::errors::{DialogError, DialogResult};
use crate::message::{SipMessage, present};
use crate::table::DialogTable;

/// How in-dialog requests are matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Route parameter only
    StrictId,
    /// Route parameter first, Call-ID and tags when it is missing or wrong
    IdWithFallback,
    /// Call-ID and tags only
    NoId,
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::IdWithFallback
    }
}

/// Which lookup produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    RouteParam,
    CallIdAndTags,
}

/// A request successfully associated with a dialog
#[derive(Debug, Clone)]
pub struct MatchedDialog {
    pub dialog: Arc<Dialog>,
    pub direction: Direction,
    pub source: MatchSource,
}

/// Matches requests against a [`DialogTable`]
#[derive(Debug, Clone, Copy)]
pub struct DialogMatcher<'a> {
    table: &'a DialogTable,
    mode: MatchMode,
    rr_param: &'a str,
}

impl<'a> DialogMatcher<'a> {
    pub fn new(table: &'a DialogTable, mode: MatchMode, rr_param: &'a str) -> Self {
        Self { table, mode, rr_param }
    }

    /// Find the dialog a request belongs to
    ///
    /// Missing Call-ID or From-tag is a protocol error, as is a missing
    /// To-tag unless `allow_missing_to_tag` is set (CANCEL, spiral checks).
    /// `Ok(None)` means the request is out-of-dialog for this server.
    pub fn match_request<M: SipMessage + ?Sized>(
        &self,
        msg: &M,
        allow_missing_to_tag: bool,
    ) -> DialogResult<Option<MatchedDialog>> {
        let call_id = present(msg.call_id())
            .ok_or_else(|| DialogError::protocol_error("request missing Call-ID"))?;
        let from_tag = present(msg.from_tag())
            .ok_or_else(|| DialogError::protocol_error("request missing From tag"))?;
        let to_tag = present(msg.to_tag());
        if to_tag.is_none() && !allow_missing_to_tag {
            return Err(DialogError::protocol_error("in-dialog request missing To tag"));
        }

        if self.mode != MatchMode::NoId {
            match msg.route_param(self.rr_param) {
                Some(value) => {
                    if let Some(found) = self.match_route_param(value, call_id, from_tag, to_tag, allow_missing_to_tag) {
                        return Ok(Some(found));
                    }
                    if self.mode == MatchMode::StrictId {
                        return Ok(None);
                    }
                }
                None if self.mode == MatchMode::StrictId => {
                    debug!("no '{}' route parameter and strict ID matching is on", self.rr_param);
                    return Ok(None);
                }
                None => {}
            }
        }

        Ok(self
            .table
            .lookup_by_key(call_id, from_tag, to_tag, allow_missing_to_tag)
            .map(|(dialog, direction)| MatchedDialog {
                dialog,
                direction,
                source: MatchSource::CallIdAndTags,
            }))
    }

    fn match_route_param(
        &self,
        value: &str,
        call_id: &str,
        from_tag: &str,
        to_tag: Option<&str>,
        allow_missing_to_tag: bool,
    ) -> Option<MatchedDialog> {
        let (entry, slot) = match route_param::decode(value) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("ignoring route parameter: {}", e);
                return None;
            }
        };
        let key = DialogKey::new(entry, slot);
        let Some(dialog) = self.table.lookup_by_id(key) else {
            debug!("route parameter {} names no live dialog", value);
            return None;
        };
        if dialog.call_id() != call_id {
            warn!(
                "route parameter {} points at dialog {} with Call-ID {}, request has {}",
                value, key, dialog.call_id(), call_id
            );
            return None;
        }
        let direction = {
            let inner = dialog.lock();
            dialog.direction_for(&inner, from_tag, to_tag, allow_missing_to_tag)
        };
        match direction {
            Some(direction) => Some(MatchedDialog { dialog, direction, source: MatchSource::RouteParam }),
            None => {
                warn!("route parameter {} matched dialog {} but tags differ", value, key);
                None
            }
        }
    }
}
