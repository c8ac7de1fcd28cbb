//! Dialog flag sets

use std::fmt;
use serde::{Serialize, Deserialize};

/// Internal dialog flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogFlags(u32);

impl DialogFlags {
    /// Dialog not yet persisted
    pub const NEW: DialogFlags = DialogFlags(1 << 0);
    /// Dialog changed since the last persistence flush
    pub const CHANGED: DialogFlags = DialogFlags(1 << 1);
    /// A BYE was seen
    pub const HAS_BYE: DialogFlags = DialogFlags(1 << 2);
    /// Send BYE to both legs when the dialog times out
    pub const TO_BYE: DialogFlags = DialogFlags(1 << 3);
    /// BYE came from the caller
    pub const CALLER_BYE: DialogFlags = DialogFlags(1 << 4);
    /// BYE came from the callee
    pub const CALLEE_BYE: DialogFlags = DialogFlags(1 << 5);
    /// Dialog variables changed since the last flush
    pub const CHANGED_VARS: DialogFlags = DialogFlags(1 << 7);
    /// Dialog is linked into the dialog table
    pub const INSERTED: DialogFlags = DialogFlags(1 << 9);
    /// Dialog timer fired
    pub const EXPIRED: DialogFlags = DialogFlags(1 << 10);
    /// Initial request spiraled back through this server
    pub const SPIRALED: DialogFlags = DialogFlags(1 << 11);

    pub const fn empty() -> Self {
        DialogFlags(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: DialogFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DialogFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: DialogFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for DialogFlags {
    type Output = DialogFlags;

    fn bitor(self, rhs: DialogFlags) -> DialogFlags {
        DialogFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for DialogFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(DialogFlags, &str); 10] = [
            (DialogFlags::NEW, "NEW"),
            (DialogFlags::CHANGED, "CHANGED"),
            (DialogFlags::HAS_BYE, "HASBYE"),
            (DialogFlags::TO_BYE, "TOBYE"),
            (DialogFlags::CALLER_BYE, "CALLERBYE"),
            (DialogFlags::CALLEE_BYE, "CALLEEBYE"),
            (DialogFlags::CHANGED_VARS, "CHANGED_VARS"),
            (DialogFlags::INSERTED, "INSERTED"),
            (DialogFlags::EXPIRED, "EXPIRED"),
            (DialogFlags::SPIRALED, "SPIRALED"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// User-controlled flags, numbered 0 to 31
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFlags(u32);

impl ScriptFlags {
    pub const MAX_FLAG: u8 = 31;

    pub fn set(&mut self, flag: u8) -> bool {
        if flag > Self::MAX_FLAG {
            return false;
        }
        self.0 |= 1 << flag;
        true
    }

    pub fn reset(&mut self, flag: u8) -> bool {
        if flag > Self::MAX_FLAG {
            return false;
        }
        self.0 &= !(1 << flag);
        true
    }

    pub fn is_set(&self, flag: u8) -> bool {
        flag <= Self::MAX_FLAG && self.0 & (1 << flag) != 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}
