//! In-dialog request matching tests

mod common;

use std::sync::Arc;

use proptest::prelude::*;

use rvoip_dialog_tracker::{
    DialogConfig, DialogManager, DialogOptions, DialogState, Direction, MatchMode, Method, SequentialOutcome,
    SimpleMessage, TransactionKey,
};

use common::*;

fn answered(manager: &DialogManager, call_id: &str, from_tag: &str, to_tag: &str) -> Arc<rvoip_dialog_tracker::Dialog> {
    let tx = TransactionKey::new(format!("tx-{call_id}"));
    let mut inv = invite(call_id, from_tag);
    let dialog = manager.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap().unwrap();
    manager.on_response(&tx, &response(200, call_id, from_tag, Some(to_tag))).unwrap();
    dialog
}

#[test]
fn test_request_without_to_tag_is_not_found() {
    let (manager, _layer) = manager();
    let dialog = answered(&manager, "abc", "f1", "t1");
    let before = dialog.snapshot();

    let bye = SimpleMessage::request(Method::Bye, "abc")
        .with_from(ALICE, Some("f1"))
        .with_to(BOB, None)
        .with_cseq(2)
        .with_route_param("did", &dialog.did());
    assert!(manager.on_sequential_request(&bye, None).is_not_found());

    let after = dialog.snapshot();
    assert_eq!(after.state, DialogState::ConfirmedNa);
    assert_eq!(after.caller.cseq, before.caller.cseq);
    assert_eq!(after.flags, before.flags);
}

#[test]
fn test_request_without_call_id_is_not_found() {
    let (manager, _layer) = manager();
    answered(&manager, "abc", "f1", "t1");
    let bye = downstream(Method::Bye, "abc", "f1", "t1", 2).without_call_id();
    assert!(manager.on_sequential_request(&bye, None).is_not_found());
    assert_eq!(manager.table().len(), 1);
}

#[test]
fn test_losing_early_leg_does_not_match_answered_call() {
    let (manager, _layer) = manager();
    let tx = TransactionKey::new("tx-fork");
    let mut inv = invite("abc", "f1");
    let dialog = manager.on_initial_request(&mut inv, Some(&tx), DialogOptions::default()).unwrap().unwrap();
    manager.on_response(&tx, &response(180, "abc", "f1", Some("t1"))).unwrap();
    manager.on_response(&tx, &response(180, "abc", "f1", Some("t2"))).unwrap();
    manager.on_response(&tx, &response(200, "abc", "f1", Some("t1"))).unwrap();
    let ack = downstream(Method::Ack, "abc", "f1", "t1", 1).with_route_param("did", &dialog.did());
    assert!(manager.on_sequential_request(&ack, None).routing().is_some());
    assert_eq!(dialog.state(), DialogState::Confirmed);

    let bye = downstream(Method::Bye, "abc", "f1", "t2", 2).with_route_param("did", &dialog.did());
    assert!(manager.on_sequential_request(&bye, None).is_not_found());
    let bye = downstream(Method::Bye, "abc", "f1", "t2", 2);
    assert!(manager.on_sequential_request(&bye, None).is_not_found());
    let bye = upstream(Method::Bye, "abc", "t2", "f1", 1);
    assert!(manager.on_sequential_request(&bye, None).is_not_found());

    assert_eq!(dialog.state(), DialogState::Confirmed);
    assert_eq!(manager.table().len(), 1);
}

#[test]
fn test_stale_route_param_falls_back_to_tags() {
    let (manager, _layer) = manager();
    let first = answered(&manager, "abc", "f1", "t1");
    let second = answered(&manager, "other", "f2", "t2");

    // parameter names the first dialog, headers name the second
    let bye = downstream(Method::Bye, "other", "f2", "t2", 2).with_route_param("did", &first.did());
    match manager.on_sequential_request(&bye, None) {
        SequentialOutcome::RoutedDownstream(routing) => assert!(Arc::ptr_eq(&routing.dialog, &second)),
        other => panic!("expected fallback match, got {:?}", other),
    }
    assert_eq!(first.state(), DialogState::ConfirmedNa);
    assert_eq!(second.state(), DialogState::Deleted);

    // parameter names a live dialog but nothing matches the headers
    let stray = downstream(Method::Bye, "unknown", "f9", "t9", 2).with_route_param("did", &first.did());
    assert!(manager.on_sequential_request(&stray, None).is_not_found());
    assert_eq!(first.state(), DialogState::ConfirmedNa);
}

#[test]
fn test_undecodable_route_param_falls_back() {
    let (manager, _layer) = manager();
    let dialog = answered(&manager, "abc", "f1", "t1");
    let ack = downstream(Method::Ack, "abc", "f1", "t1", 1).with_route_param("did", "not-hex");
    assert!(matches!(manager.on_sequential_request(&ack, None), SequentialOutcome::RoutedDownstream(_)));
    assert_eq!(dialog.state(), DialogState::Confirmed);
}

#[test]
fn test_strict_id_matching() {
    let (manager, _layer) = manager_with(DialogConfig::default().with_match_mode(MatchMode::StrictId));
    let dialog = answered(&manager, "abc", "f1", "t1");

    let without = downstream(Method::Ack, "abc", "f1", "t1", 1);
    assert!(manager.on_sequential_request(&without, None).is_not_found());
    assert_eq!(dialog.state(), DialogState::ConfirmedNa);

    let with = downstream(Method::Ack, "abc", "f1", "t1", 1).with_route_param("did", &dialog.did());
    assert!(matches!(manager.on_sequential_request(&with, None), SequentialOutcome::RoutedDownstream(_)));
    assert_eq!(dialog.state(), DialogState::Confirmed);

    let stale = downstream(Method::Bye, "abc", "f1", "t1", 2).with_route_param("did", "ffff.1");
    assert!(manager.on_sequential_request(&stale, None).is_not_found());
}

#[test]
fn test_no_id_matching_ignores_route_param() {
    let (manager, _layer) = manager_with(DialogConfig::default().with_match_mode(MatchMode::NoId));
    let dialog = answered(&manager, "abc", "f1", "t1");
    let ack = downstream(Method::Ack, "abc", "f1", "t1", 1).with_route_param("did", "ffff.1");
    assert!(matches!(manager.on_sequential_request(&ack, None), SequentialOutcome::RoutedDownstream(_)));
    assert_eq!(dialog.state(), DialogState::Confirmed);
}

#[test]
fn test_custom_route_param_name() {
    let (manager, _layer) = manager_with(DialogConfig::default().with_rr_param("dlg"));
    let mut inv = invite("abc", "f1");
    let dialog = manager.on_initial_request(&mut inv, None, DialogOptions::default()).unwrap().unwrap();
    assert_eq!(inv.added_route_params(), &[("dlg".to_string(), dialog.did())]);
}

#[test]
fn test_response_is_not_a_sequential_request() {
    let (manager, _layer) = manager();
    let reply = response(200, "abc", "f1", Some("t1"));
    assert!(matches!(manager.on_sequential_request(&reply, None), SequentialOutcome::Error(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_recorded_leg_matches_in_both_directions(
        call_id in "[a-z0-9]{1,16}@[a-z]{1,8}",
        from_tag in "[a-z0-9]{1,10}",
        to_tag in "[A-Z0-9]{1,10}",
        with_param in any::<bool>(),
    ) {
        let (manager, _layer) = manager();
        let dialog = answered(&manager, &call_id, &from_tag, &to_tag);
        let did = dialog.did();

        let mut down = downstream(Method::Info, &call_id, &from_tag, &to_tag, 2);
        let mut up = upstream(Method::Info, &call_id, &to_tag, &from_tag, 1);
        if with_param {
            down = down.with_route_param("did", &did);
            up = up.with_route_param("did", &did);
        }

        match manager.on_sequential_request(&down, None) {
            SequentialOutcome::RoutedDownstream(routing) => {
                prop_assert!(Arc::ptr_eq(&routing.dialog, &dialog));
            }
            other => prop_assert!(false, "downstream request matched as {:?}", other),
        }
        let (found, direction) = manager.dialog_by_key(&call_id, &to_tag, &from_tag).unwrap();
        prop_assert!(Arc::ptr_eq(&found, &dialog));
        prop_assert_eq!(direction, Direction::Upstream);
        match manager.on_sequential_request(&up, None) {
            SequentialOutcome::RoutedUpstream(routing) => {
                prop_assert!(Arc::ptr_eq(&routing.dialog, &dialog));
            }
            other => prop_assert!(false, "upstream request matched as {:?}", other),
        }
    }
}
