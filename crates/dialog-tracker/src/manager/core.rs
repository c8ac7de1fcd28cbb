//! Core DialogManager implementation
//!
//! The manager wires the dialog table, the matcher, the state machine, the
//! timer wheel and the callback registry together. It is cheap to clone;
//! every clone shares the same state.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;

use super::stats::DialogStats;
use crate::config::DialogConfig;
use crate::dialog::Dialog;
use crate::errors::DialogResult;
use crate::events::{CallbackKind, CallbackParams, DialogCallbacks, DialogEvent, EventPublisher};
use crate::persistence::DialogPersistence;
use crate::profiles::DialogProfiles;
use crate::routing::Direction;
use crate::table::DialogTable;
use crate::timer::DialogTimer;
use crate::transaction::{TransactionInterest, TransactionKey, TransactionLayer};

/// A transaction the manager asked to hear about
#[derive(Debug, Clone)]
pub(crate) struct TransactionBinding {
    pub dialog: Arc<Dialog>,
    pub interest: TransactionInterest,
    /// Direction of the request that created the transaction
    pub direction: Direction,
}

/// Dialog tracking engine
#[derive(Clone)]
pub struct DialogManager {
    pub(crate) config: Arc<DialogConfig>,
    pub(crate) table: Arc<DialogTable>,
    pub(crate) timer: Arc<DialogTimer>,
    pub(crate) callbacks: Arc<DialogCallbacks>,
    pub(crate) events: Arc<EventPublisher>,
    pub(crate) profiles: Arc<DialogProfiles>,
    pub(crate) stats: Arc<DialogStats>,
    /// Transactions whose events concern a dialog
    pub(crate) transactions: Arc<DashMap<TransactionKey, TransactionBinding>>,
    pub(crate) transaction_layer: Arc<dyn TransactionLayer>,
    pub(crate) persistence: Option<Arc<dyn DialogPersistence>>,
}

impl fmt::Debug for DialogManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogManager")
            .field("config", &self.config)
            .field("dialogs", &self.table.len())
            .field("timers", &self.timer.len())
            .field("transactions", &self.transactions.len())
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

impl DialogManager {
    /// Create a manager after validating `config`
    pub fn new(config: DialogConfig, transaction_layer: Arc<dyn TransactionLayer>) -> DialogResult<Self> {
        config.validate()?;
        let table = DialogTable::new(config.effective_hash_size());
        let profiles = DialogProfiles::new(&config.profiles_with_value, &config.profiles_no_value);
        info!(
            "dialog tracker started: {} buckets, rr_param={}, match_mode={:?}",
            table.size(), config.rr_param, config.match_mode
        );
        Ok(Self {
            config: Arc::new(config),
            table: Arc::new(table),
            timer: Arc::new(DialogTimer::new()),
            callbacks: Arc::new(DialogCallbacks::new()),
            events: Arc::new(EventPublisher::new()),
            profiles: Arc::new(profiles),
            stats: Arc::new(DialogStats::default()),
            transactions: Arc::new(DashMap::new()),
            transaction_layer,
            persistence: None,
        })
    }

    /// Attach a persistence backend
    pub fn with_persistence(mut self, persistence: Arc<dyn DialogPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn config(&self) -> &DialogConfig {
        &self.config
    }

    pub fn table(&self) -> &DialogTable {
        &self.table
    }

    pub fn timer(&self) -> &DialogTimer {
        &self.timer
    }

    pub fn stats(&self) -> &DialogStats {
        &self.stats
    }

    /// Register a callback for one category
    pub fn register_callback<F>(&self, kind: CallbackKind, handler: F)
    where
        F: Fn(&CallbackParams<'_>) + Send + Sync + 'static,
    {
        self.callbacks.register(kind, handler);
    }

    /// Publish [`DialogEvent`]s on `sender`
    pub fn set_event_sender(&self, sender: mpsc::Sender<DialogEvent>) {
        self.events.set_sender(sender);
    }

    /// Number of transactions currently bound to dialogs
    pub fn bound_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub(crate) fn bind_transaction(
        &self,
        key: TransactionKey,
        dialog: &Arc<Dialog>,
        interest: TransactionInterest,
        direction: Direction,
    ) -> DialogResult<()> {
        self.transaction_layer
            .register_callback(&key, interest)
            .map_err(crate::errors::DialogError::transaction)?;
        self.transactions.insert(key, TransactionBinding { dialog: dialog.clone(), interest, direction });
        Ok(())
    }

    /// Drop every transaction binding that points at `dialog`
    pub(crate) fn unbind_dialog(&self, dialog: &Arc<Dialog>) -> usize {
        let mut removed = 0;
        self.transactions.retain(|_, binding| {
            let keep = !Arc::ptr_eq(&binding.dialog, dialog);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}
