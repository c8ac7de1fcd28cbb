//! Shared helpers for dialog tracker integration tests

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use rvoip_dialog_tracker::{
    CallbackKind, DialogConfig, DialogManager, DialogPersistence, DialogSnapshot, InDialogRequest, Method,
    SimpleMessage, TransactionInterest, TransactionKey, TransactionLayer,
};

pub const ALICE: &str = "sip:alice@example.com";
pub const BOB: &str = "sip:bob@example.com";
pub const ALICE_CONTACT: &str = "sip:alice@10.0.0.1:5060";
pub const PROXY_RR: &str = "<sip:proxy.example.com;lr>";

/// Transaction layer double recording every call
#[derive(Debug, Default)]
pub struct RecordingTransactionLayer {
    pub registered: Mutex<Vec<(TransactionKey, TransactionInterest)>>,
    pub sent: Mutex<Vec<InDialogRequest>>,
    /// Returned by `lookup_transaction` when set
    pub lookup_result: Mutex<Option<TransactionKey>>,
    pub fail_register: Mutex<bool>,
}

impl RecordingTransactionLayer {
    pub fn sent_byes(&self) -> Vec<InDialogRequest> {
        self.sent.lock().iter().filter(|r| r.method == Method::Bye).cloned().collect()
    }

    pub fn interest_of(&self, key: &TransactionKey) -> Option<TransactionInterest> {
        self.registered
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, interest)| *interest)
    }
}

impl TransactionLayer for RecordingTransactionLayer {
    fn register_callback(&self, transaction: &TransactionKey, interest: TransactionInterest) -> anyhow::Result<()> {
        if *self.fail_register.lock() {
            anyhow::bail!("transaction {} is gone", transaction);
        }
        self.registered.lock().push((transaction.clone(), interest));
        Ok(())
    }

    fn lookup_transaction(&self, _call_id: &str, _cseq: u32) -> Option<TransactionKey> {
        self.lookup_result.lock().clone()
    }

    fn send_request(&self, request: InDialogRequest) -> anyhow::Result<()> {
        self.sent.lock().push(request);
        Ok(())
    }
}

/// Persistence double keeping the last flushed snapshot per dialog
#[derive(Debug, Default)]
pub struct RecordingPersistence {
    pub flushed: Mutex<Vec<DialogSnapshot>>,
    pub removed: Mutex<Vec<DialogSnapshot>>,
}

impl DialogPersistence for RecordingPersistence {
    fn flush(&self, dialog: &DialogSnapshot) -> anyhow::Result<()> {
        self.flushed.lock().push(dialog.clone());
        Ok(())
    }

    fn remove(&self, dialog: &DialogSnapshot) -> anyhow::Result<()> {
        self.removed.lock().push(dialog.clone());
        Ok(())
    }
}

pub fn manager_with(config: DialogConfig) -> (DialogManager, Arc<RecordingTransactionLayer>) {
    let layer = Arc::new(RecordingTransactionLayer::default());
    let manager = DialogManager::new(config, layer.clone()).expect("valid config");
    (manager, layer)
}

pub fn manager() -> (DialogManager, Arc<RecordingTransactionLayer>) {
    manager_with(DialogConfig::default().with_hash_size(64))
}

/// Record every callback kind fired, in order
pub fn record_callbacks(manager: &DialogManager, kinds: &[CallbackKind]) -> Arc<Mutex<Vec<CallbackKind>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let seen = seen.clone();
        manager.register_callback(*kind, move |params| seen.lock().push(params.kind));
    }
    seen
}

pub fn invite(call_id: &str, from_tag: &str) -> SimpleMessage {
    SimpleMessage::request(Method::Invite, call_id)
        .with_from(ALICE, Some(from_tag))
        .with_to(BOB, None)
        .with_cseq(1)
        .with_contact(ALICE_CONTACT)
        .with_request_uri(BOB)
        .with_record_route(PROXY_RR)
}

pub fn response(code: u16, call_id: &str, from_tag: &str, to_tag: Option<&str>) -> SimpleMessage {
    let contact = format!("sip:bob-{}@10.0.0.2:5060", to_tag.unwrap_or("none"));
    SimpleMessage::response(code, call_id)
        .with_from(ALICE, Some(from_tag))
        .with_to(BOB, to_tag)
        .with_cseq(1)
        .with_contact(&contact)
        .with_record_route(PROXY_RR)
}

/// Request from the caller toward the callee
pub fn downstream(method: Method, call_id: &str, from_tag: &str, to_tag: &str, cseq: u32) -> SimpleMessage {
    SimpleMessage::request(method, call_id)
        .with_from(ALICE, Some(from_tag))
        .with_to(BOB, Some(to_tag))
        .with_cseq(cseq)
}

/// Request from the callee toward the caller
pub fn upstream(method: Method, call_id: &str, callee_tag: &str, caller_tag: &str, cseq: u32) -> SimpleMessage {
    SimpleMessage::request(method, call_id)
        .with_from(BOB, Some(callee_tag))
        .with_to(ALICE, Some(caller_tag))
        .with_cseq(cseq)
}

/// Route parameter value added to an initial request
pub fn added_did(msg: &SimpleMessage) -> String {
    msg.added_route_params()
        .iter()
        .find(|(name, _)| name == "did")
        .map(|(_, value)| value.clone())
        .expect("route parameter added")
}
