//! Dialog Manager Module
//!
//! The [`DialogManager`] is the entry point for the proxy: it creates
//! dialogs from initial requests, routes in-dialog requests, consumes
//! transaction events and expires dialogs on timer ticks. Its operations are
//! split across focused submodules.

// Core manager and shared state
pub mod core;

// Request handling
pub mod initial;
pub mod sequential;

// Transaction events
pub mod response_lifecycle;

// Timers and cleanup
pub mod expiration;

// Management surface and per-dialog data
pub mod admin;
pub mod current;
pub mod stats;

mod transitions;

pub use core::DialogManager;
pub use admin::TerminateSide;
pub use current::clear_current_dialog;
pub use expiration::CleanupReport;
pub use initial::DialogOptions;
pub use sequential::{Routing, SequentialOutcome};
pub use stats::{DialogStats, StatsSnapshot};
