//! # RVoIP Dialog Tracker
//!
//! Dialog state tracking for stateful SIP proxies.
//!
//! The tracker follows every INVITE-initiated dialog passing through a proxy
//! from the initial request to its end: it correlates forked branches,
//! matches in-dialog requests back to their dialog, expires dialogs that
//! outlive their lifetime and notifies interested code of every milestone.
//! It does not parse, send or retransmit SIP messages itself; those jobs
//! belong to the parser and the transaction layer it is wired to.
//!
//! ## Features
//!
//! - **Sharded dialog table**: per-bucket locking, `(entry, slot)` identities
//! - **Route parameter matching**: dialog identity carried in Record-Route,
//!   with Call-ID/tag fallback
//! - **Pure state machine**: transitions computed without side effects
//! - **Forking**: early branches, concurrently confirmed legs spawning
//!   sibling dialogs
//! - **Timers**: no-answer and lifetime expiration with optional BYE
//! - **Callbacks and events**: synchronous handlers and a tokio channel
//! - **Profiles, variables, flags**: per-dialog data for routing logic
//!
//! ## Architecture
//!
//! ```text
//!               ┌──────────────────────────────┐
//!  SIP core ───▶│         DialogManager        │◀─── TransactionLayer
//!               ├──────────┬─────────┬─────────┤
//!               │ matcher  │  state  │callbacks│
//!               │          │ machine │ events  │
//!               ├──────────┴─────────┴─────────┤
//!               │  DialogTable   │ DialogTimer │◀─── timer driver
//!               └──────────────────────────────┘
//! ```
//!
//! Lock order is bucket → dialog → timer. Callbacks run after the dialog
//! lock is released and receive a [`DialogSnapshot`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_dialog_tracker::{DialogConfig, DialogManager, DialogOptions, TransactionLayer};
//! use rvoip_dialog_tracker::{Method, SimpleMessage, SequentialOutcome};
//!
//! fn run(layer: Arc<dyn TransactionLayer>) -> rvoip_dialog_tracker::DialogResult<()> {
//!     let manager = DialogManager::new(DialogConfig::default(), layer)?;
//!
//!     let mut invite = SimpleMessage::request(Method::Invite, "call-1@host")
//!         .with_from("sip:alice@example.com", Some("a1"))
//!         .with_to("sip:bob@example.com", None)
//!         .with_cseq(1)
//!         .with_contact("sip:alice@10.0.0.1");
//!     let dialog = manager.on_initial_request(&mut invite, None, DialogOptions::default())?;
//!     println!("tracking {:?}", dialog.map(|d| d.key()));
//!
//!     let bye = SimpleMessage::request(Method::Bye, "call-1@host")
//!         .with_from("sip:alice@example.com", Some("a1"))
//!         .with_to("sip:bob@example.com", Some("b1"))
//!         .with_cseq(2);
//!     if let SequentialOutcome::RoutedDownstream(routing) = manager.on_sequential_request(&bye, None) {
//!         println!("BYE goes to {:?}", routing.target);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dialog;
pub mod errors;
pub mod events;
pub mod logging;
pub mod manager;
pub mod message;
pub mod persistence;
pub mod profiles;
pub mod routing;
pub mod state_machine;
pub mod table;
pub mod timer;
pub mod transaction;

// Re-export key types
pub use config::DialogConfig;
pub use dialog::{Dialog, DialogFlags, DialogKey, DialogSnapshot, DialogState};
pub use errors::{DialogError, DialogResult};
pub use events::{CallbackKind, CallbackParams, DialogEvent};
pub use manager::{
    clear_current_dialog, CleanupReport, DialogManager, DialogOptions, Routing, SequentialOutcome,
    StatsSnapshot, TerminateSide,
};
pub use message::{Method, SimpleMessage, SipMessage};
pub use persistence::{DialogPersistence, PersistenceMode};
pub use routing::{Direction, MatchMode};
pub use state_machine::{Outcome, StateEvent, Transition};
pub use timer::{spawn_timer_driver, TimerDriverHandle};
pub use transaction::{
    InDialogRequest, LegSide, TransactionEvent, TransactionInterest, TransactionKey, TransactionLayer,
};
