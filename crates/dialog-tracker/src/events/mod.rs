//! Dialog notifications
//!
//! Two delivery paths exist side by side:
//!
//! - [`DialogCallbacks`]: synchronous handlers per [`CallbackKind`], run on
//!   the worker that caused the event
//! - [`EventPublisher`]: [`DialogEvent`]s pushed onto an optional tokio
//!   channel without blocking

pub mod callbacks;
pub mod dialog_events;

pub use callbacks::{CallbackKind, CallbackParams, DialogCallback, DialogCallbacks};
pub use dialog_events::{DialogEvent, EventPublisher};
