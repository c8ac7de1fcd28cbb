//! Dialog state management
//!
//! Represents the states a tracked dialog moves through. States are ordered:
//! a dialog only ever moves to a state of equal or higher [`DialogState::rank`],
//! and [`DialogState::Deleted`] is absorbing.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Represents the state of a tracked dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogState {
    /// Initial request seen, no provisional response with a To-tag yet
    Unconfirmed,

    /// Provisional response with a To-tag seen
    Early,

    /// 2xx seen, ACK not seen yet
    ConfirmedNa,

    /// ACK seen
    Confirmed,

    /// A second callee leg answered after the dialog was confirmed
    ConcurrentlyConfirmed,

    /// Terminal state
    Deleted,
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogState::Unconfirmed => write!(f, "Unconfirmed"),
            DialogState::Early => write!(f, "Early"),
            DialogState::ConfirmedNa => write!(f, "ConfirmedNa"),
            DialogState::Confirmed => write!(f, "Confirmed"),
            DialogState::ConcurrentlyConfirmed => write!(f, "ConcurrentlyConfirmed"),
            DialogState::Deleted => write!(f, "Deleted"),
        }
    }
}

impl DialogState {
    /// Position in the forward-only ordering of states
    pub fn rank(&self) -> u8 {
        match self {
            DialogState::Unconfirmed => 0,
            DialogState::Early => 1,
            DialogState::ConfirmedNa => 2,
            DialogState::Confirmed => 3,
            DialogState::ConcurrentlyConfirmed => 4,
            DialogState::Deleted => 5,
        }
    }

    /// Numeric status code exposed through introspection accessors
    pub fn code(&self) -> u8 {
        match self {
            DialogState::Unconfirmed => 1,
            DialogState::Early => 2,
            DialogState::ConfirmedNa => 3,
            DialogState::Confirmed => 4,
            DialogState::Deleted => 5,
            DialogState::ConcurrentlyConfirmed => 6,
        }
    }

    /// Setup has not completed yet
    pub fn is_setup(&self) -> bool {
        matches!(self, DialogState::Unconfirmed | DialogState::Early)
    }

    /// A 2xx has been seen for the dialog
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            DialogState::ConfirmedNa | DialogState::Confirmed | DialogState::ConcurrentlyConfirmed
        )
    }

    /// Check if the dialog is deleted
    pub fn is_deleted(&self) -> bool {
        matches!(self, DialogState::Deleted)
    }
}
