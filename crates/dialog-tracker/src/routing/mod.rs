//! Request routing support
//!
//! - [`route_param`]: codec for the dialog route parameter
//! - [`dialog_matcher`]: association of in-dialog requests with dialogs

pub mod dialog_matcher;
pub mod route_param;

use std::fmt;
use serde::{Serialize, Deserialize};

pub use dialog_matcher::{DialogMatcher, MatchMode, MatchSource, MatchedDialog};

/// Direction of a message relative to the initial request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Not tied to a direction (timer, administrative action)
    None,
    /// From caller toward callee
    Downstream,
    /// From callee toward caller
    Upstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::None => write!(f, "none"),
            Direction::Downstream => write!(f, "downstream"),
            Direction::Upstream => write!(f, "upstream"),
        }
    }
}
