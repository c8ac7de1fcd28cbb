//! Dialog identifiers
//!
//! A dialog is addressed internally by its [`DialogKey`], the
//! `(hash_entry, hash_slot)` pair assigned when it is linked into the
//! dialog table. The same pair, encoded with
//! [`route_param`](crate::routing::route_param), travels in Record-Route
//! and doubles as the dialog-id used for fork correlation.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::routing::route_param;

/// Table address of a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DialogKey {
    /// Bucket index, `hash(call_id) mod table size`
    pub entry: u32,
    /// Per-bucket slot id, never 0 for a linked dialog
    pub slot: u32,
}

impl DialogKey {
    pub fn new(entry: u32, slot: u32) -> Self {
        Self { entry, slot }
    }

    /// Route parameter value carrying this key
    pub fn to_route_param(&self) -> String {
        route_param::encode(self.entry, self.slot)
    }
}

impl fmt::Display for DialogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entry, self.slot)
    }
}
