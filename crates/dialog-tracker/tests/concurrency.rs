//! Concurrent access tests
//!
//! Many workers drive disjoint and shared dialogs at once; every dialog
//! must end exactly once and be freed afterwards.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use tokio::time::Instant;

use rvoip_dialog_tracker::{
    clear_current_dialog, CallbackKind, Dialog, DialogConfig, DialogOptions, DialogState, Method, Outcome,
    SequentialOutcome, TerminateSide, TransactionKey,
};

use common::*;

const WORKERS: usize = 8;
const CALLS_PER_WORKER: usize = 50;

#[test]
fn test_parallel_calls_are_isolated() {
    let (manager, _layer) = manager_with(DialogConfig::default().with_hash_size(32));
    let ended = Arc::new(AtomicUsize::new(0));
    {
        let ended = ended.clone();
        manager.register_callback(CallbackKind::Terminated, move |_| {
            ended.fetch_add(1, Ordering::SeqCst);
        });
    }

    let weaks: Vec<Weak<Dialog>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let manager = manager.clone();
                scope.spawn(move || {
                    let mut weaks = Vec::new();
                    for call in 0..CALLS_PER_WORKER {
                        let call_id = format!("call-{worker}-{call}@host");
                        let tx = TransactionKey::new(format!("tx-{call_id}"));
                        let mut inv = invite(&call_id, "f1");
                        let dialog = manager
                            .on_initial_request(&mut inv, Some(&tx), DialogOptions::default())
                            .unwrap()
                            .unwrap();
                        manager.on_response(&tx, &response(200, &call_id, "f1", Some("t1"))).unwrap();
                        let ack = downstream(Method::Ack, &call_id, "f1", "t1", 1).with_route_param("did", &dialog.did());
                        assert!(matches!(manager.on_sequential_request(&ack, None), SequentialOutcome::RoutedDownstream(_)));
                        assert_eq!(dialog.state(), DialogState::Confirmed);

                        let bye = upstream(Method::Bye, &call_id, "t1", "f1", 1);
                        assert!(matches!(manager.on_sequential_request(&bye, None), SequentialOutcome::RoutedUpstream(_)));
                        manager.on_transaction_destroyed(&tx).unwrap();
                        weaks.push(Arc::downgrade(&dialog));
                    }
                    clear_current_dialog();
                    weaks
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(ended.load(Ordering::SeqCst), WORKERS * CALLS_PER_WORKER);
    assert!(manager.table().is_empty());
    assert!(manager.timer().is_empty());
    assert_eq!(manager.bound_transactions(), 0);
    assert!(weaks.iter().all(|weak| weak.upgrade().is_none()));
}

#[test]
fn test_bye_racing_expiration_ends_each_dialog_once() {
    let (manager, _layer) = manager_with(DialogConfig::default().with_hash_size(8).without_bye_on_timeout());
    let ended = Arc::new(AtomicUsize::new(0));
    for kind in [CallbackKind::Terminated, CallbackKind::Expired] {
        let ended = ended.clone();
        manager.register_callback(kind, move |_| {
            ended.fetch_add(1, Ordering::SeqCst);
        });
    }

    const CALLS: usize = 200;
    let mut weaks = Vec::new();
    for call in 0..CALLS {
        let call_id = format!("race-{call}");
        let tx = TransactionKey::new(format!("tx-{call_id}"));
        let mut inv = invite(&call_id, "f1");
        let dialog = manager.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap().unwrap();
        manager.on_response(&tx, &response(200, &call_id, "f1", Some("t1"))).unwrap();
        manager.on_transaction_destroyed(&tx).unwrap();
        weaks.push(Arc::downgrade(&dialog));
    }
    clear_current_dialog();

    let far_future = Instant::now() + Duration::from_secs(365 * 24 * 3600);
    thread::scope(|scope| {
        let byes = manager.clone();
        scope.spawn(move || {
            for call in 0..CALLS {
                let bye = downstream(Method::Bye, &format!("race-{call}"), "f1", "t1", 2);
                let _ = byes.on_sequential_request(&bye, None);
            }
            clear_current_dialog();
        });
        let ticks = manager.clone();
        scope.spawn(move || {
            for _ in 0..CALLS {
                ticks.on_timer_tick(far_future);
                thread::yield_now();
            }
        });
    });
    manager.on_timer_tick(far_future);

    assert_eq!(ended.load(Ordering::SeqCst), CALLS);
    assert!(manager.table().is_empty());
    assert!(weaks.iter().all(|weak| weak.upgrade().is_none()));
}

#[test]
fn test_callback_may_reenter_manager() {
    let (manager, _layer) = manager();
    let observed = Arc::new(AtomicUsize::new(0));
    {
        let inner = manager.clone();
        let observed = observed.clone();
        manager.register_callback(CallbackKind::Confirmed, move |params| {
            // the dialog lock is not held while callbacks run
            let dialog = inner.get_dialog(params.dialog.key).expect("still linked");
            inner.set_var(&dialog, "seen", "yes");
            observed.fetch_add(1, Ordering::SeqCst);
        });
    }
    let tx = TransactionKey::new("tx-reenter");
    let mut inv = invite("abc", "f1");
    let dialog = manager.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap().unwrap();
    manager.on_response(&tx, &response(200, "abc", "f1", Some("t1"))).unwrap();
    manager.on_sequential_request(&downstream(Method::Ack, "abc", "f1", "t1", 1), None);

    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert_eq!(manager.get_var(&dialog, "seen").as_deref(), Some("yes"));
}

#[test]
fn test_stale_cleanup_alongside_new_calls() {
    let (manager, _layer) = manager_with(DialogConfig::default().with_hash_size(8));
    const CALLS: usize = 500;

    let reaped = thread::scope(|scope| {
        let creator = manager.clone();
        let calls = scope.spawn(move || {
            for call in 0..CALLS {
                let call_id = format!("setup-{call}");
                let tx = TransactionKey::new(format!("tx-{call_id}"));
                let mut inv = invite(&call_id, "f1");
                creator.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap();
            }
            clear_current_dialog();
        });

        let mut reaped = 0;
        while !calls.is_finished() {
            let report = manager.clean_stale(chrono::Utc::now() + chrono::Duration::hours(1));
            reaped += report.destroyed;
        }
        calls.join().unwrap();
        reaped
    });
    let reaped = reaped + manager.clean_stale(chrono::Utc::now() + chrono::Duration::hours(1)).destroyed;

    assert_eq!(reaped, CALLS);
    assert!(manager.table().is_empty());
    assert_eq!(manager.stats().snapshot().failed, CALLS as u64);

    // a binding made after its dialog was reaped goes with the transaction
    for call in 0..CALLS {
        let tx = TransactionKey::new(format!("tx-setup-{call}"));
        manager.on_transaction_destroyed(&tx).unwrap();
    }
    assert_eq!(manager.bound_transactions(), 0);
}

#[test]
fn test_admin_terminate_racing_bye_ends_each_dialog_once() {
    let (manager, layer) = manager_with(DialogConfig::default().with_hash_size(8));
    let ended = Arc::new(AtomicUsize::new(0));
    {
        let ended = ended.clone();
        manager.register_callback(CallbackKind::Terminated, move |_| {
            ended.fetch_add(1, Ordering::SeqCst);
        });
    }

    const CALLS: usize = 200;
    let mut keys = Vec::new();
    for call in 0..CALLS {
        let call_id = format!("admin-{call}");
        let tx = TransactionKey::new(format!("tx-{call_id}"));
        let mut inv = invite(&call_id, "f1");
        let dialog = manager.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap().unwrap();
        manager.on_response(&tx, &response(200, &call_id, "f1", Some("t1"))).unwrap();
        manager.on_sequential_request(&downstream(Method::Ack, &call_id, "f1", "t1", 1), None);
        manager.on_transaction_destroyed(&tx).unwrap();
        keys.push(dialog.key());
    }
    clear_current_dialog();

    let (by_bye, by_admin) = thread::scope(|scope| {
        let byes = manager.clone();
        let remote = scope.spawn(move || {
            let mut ended = 0;
            for call in 0..CALLS {
                let bye = upstream(Method::Bye, &format!("admin-{call}"), "t1", "f1", 1);
                let outcome = byes.on_sequential_request(&bye, None);
                if outcome.routing().and_then(|r| r.transition.outcome) == Some(Outcome::Terminated) {
                    ended += 1;
                }
            }
            clear_current_dialog();
            ended
        });
        let admin = manager.clone();
        let local = scope.spawn(move || {
            let mut ended = 0;
            for key in keys {
                if let Ok(sent) = admin.terminate_dialog(key, TerminateSide::Callee) {
                    assert_eq!(sent, 1);
                    ended += 1;
                }
                thread::yield_now();
            }
            ended
        });
        (remote.join().unwrap(), local.join().unwrap())
    });

    assert_eq!(by_bye + by_admin, CALLS);
    assert_eq!(ended.load(Ordering::SeqCst), CALLS);
    assert_eq!(layer.sent_byes().len(), by_admin);
    assert!(manager.table().is_empty());
}
