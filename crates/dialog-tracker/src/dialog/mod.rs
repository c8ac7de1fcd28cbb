//! Core dialog types
//!
//! - [`DialogKey`]: `(hash_entry, hash_slot)` table address, also the route parameter
//! - [`Dialog`]: shared, internally locked dialog record
//! - [`DialogState`]: lifecycle states
//! - [`CallerLeg`] / [`CalleeLeg`]: per-side signaling state
//!
//! ## Dialog Lifecycle
//!
//! ```text
//! Unconfirmed → Early → ConfirmedNa → Confirmed → Deleted
//!      │          │          │             │
//!   INVITE      1xx        2xx           ACK        BYE / timeout / failure
//!                                          │
//!                                          └─ 2xx on another leg → ConcurrentlyConfirmed
//! ```

pub mod dialog_id;
pub mod dialog_impl;
pub mod dialog_state;
pub mod flags;
pub mod leg;

// Re-export main types
pub use dialog_id::DialogKey;
pub use dialog_impl::{ConcurrentLink, Dialog, DialogInner, DialogSnapshot};
pub use dialog_state::DialogState;
pub use flags::{DialogFlags, ScriptFlags};
pub use leg::{CalleeLeg, CallerLeg};
