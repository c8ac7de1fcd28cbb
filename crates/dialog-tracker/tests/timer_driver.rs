//! Timer driver and event channel tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use rvoip_dialog_tracker::{
    spawn_timer_driver, DialogConfig, DialogEvent, DialogOptions, DialogState, Method, PersistenceMode,
    TransactionKey,
};

use common::*;

#[tokio::test(start_paused = true)]
async fn test_driver_expires_unanswered_dialog() {
    let config = DialogConfig::default()
        .with_no_answer_timeout(5)
        .with_timer_tick_interval(Duration::from_millis(500));
    let (manager, _layer) = manager_with(config);
    let driver = spawn_timer_driver(manager.clone());

    let tx = TransactionKey::new("tx-1");
    let mut inv = invite("abc", "f1");
    let dialog = manager.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap().unwrap();
    manager.on_response(&tx, &response(180, "abc", "f1", Some("t1"))).unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(dialog.state(), DialogState::Early);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(dialog.state(), DialogState::Deleted);
    assert!(manager.table().is_empty());

    driver.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_driver_flushes_in_delayed_mode() {
    let config = DialogConfig::default().with_persistence_mode(PersistenceMode::Delayed);
    let (manager, _layer) = manager_with(config);
    let store = Arc::new(RecordingPersistence::default());
    let manager = manager.with_persistence(store.clone());
    let driver = spawn_timer_driver(manager.clone());

    let tx = TransactionKey::new("tx-1");
    let mut inv = invite("abc", "f1");
    manager.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap();
    manager.on_response(&tx, &response(200, "abc", "f1", Some("t1"))).unwrap();
    assert!(store.flushed.lock().is_empty());

    tokio::time::sleep(manager.config().persistence_flush_interval + Duration::from_secs(1)).await;
    assert_eq!(store.flushed.lock().len(), 1);

    driver.shutdown().await;
}

#[tokio::test]
async fn test_driver_stops_on_shutdown() {
    let (manager, _layer) = manager();
    let driver = spawn_timer_driver(manager);
    assert!(!driver.is_finished());
    tokio::time::timeout(Duration::from_secs(5), driver.shutdown())
        .await
        .expect("driver stopped");
}

#[tokio::test]
async fn test_lifecycle_events_are_published() {
    let (manager, _layer) = manager();
    let (sender, mut events) = mpsc::channel(16);
    manager.set_event_sender(sender);

    let tx = TransactionKey::new("tx-ev");
    let mut inv = invite("abc", "f1");
    let dialog = manager.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap().unwrap();
    let key = dialog.key();
    manager.on_response(&tx, &response(200, "abc", "f1", Some("t1"))).unwrap();
    manager.on_sequential_request(&downstream(Method::Bye, "abc", "f1", "t1", 2), None);

    assert_eq!(events.recv().await, Some(DialogEvent::Created { key, call_id: "abc".into() }));
    assert_eq!(
        events.recv().await,
        Some(DialogEvent::StateChanged {
            key,
            old_state: DialogState::Unconfirmed,
            new_state: DialogState::ConfirmedNa,
        })
    );
    assert_eq!(
        events.recv().await,
        Some(DialogEvent::StateChanged {
            key,
            old_state: DialogState::ConfirmedNa,
            new_state: DialogState::Deleted,
        })
    );
    match events.recv().await {
        Some(DialogEvent::Terminated { key: ended, reason }) => {
            assert_eq!(ended, key);
            assert_eq!(reason, "Terminated");
        }
        other => panic!("expected Terminated event, got {:?}", other),
    }
}
