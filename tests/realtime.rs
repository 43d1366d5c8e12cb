//! Presence and broadcast behavior between concurrent editors.

mod fixtures;

use assured::api::realtime::WireMessage;
use assured::service::{ParentInfo, ShareEntry, TopicSubscription};

use fixtures::{add_goal, create_case, register, service};

fn drain(sub: &TopicSubscription) -> Vec<WireMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = sub.try_recv() {
        out.push(msg);
    }
    out
}

fn usernames_in(msg: &WireMessage) -> Vec<String> {
    msg.content.as_ref().expect("content")["current_connections"]
        .as_array()
        .expect("connections array")
        .iter()
        .filter_map(|v| v["user"].as_str().map(str::to_string))
        .collect()
}

#[test]
fn chat_reaches_other_subscribers_without_echo() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let case = create_case(&service, &alice, "chat");
    service
        .share_with(
            &alice.principal,
            case,
            &[ShareEntry {
                email: "bob@example.org".into(),
                view: Some(true),
                edit: None,
                review: None,
            }],
        )
        .expect("share");

    let sub_a = service
        .subscribe(&alice.principal, case, "ch-a")
        .expect("alice subscribes");
    let sub_b = service
        .subscribe(&bob.principal, case, "ch-b")
        .expect("bob subscribes");
    drain(&sub_a);
    drain(&sub_b);

    service
        .handle_client_message(&alice.principal, case, "ch-a", r#"{"content":"hello"}"#)
        .expect("send chat");

    let received = sub_b.recv().expect("bob receives");
    assert_eq!(received.kind, "case_message");
    assert_eq!(received.content.as_ref().and_then(|c| c.as_str()), Some("hello"));
    assert_eq!(received.username.as_deref(), Some("alice"));
    assert_eq!(received.id, Some(alice.principal.id));
    assert!(drain(&sub_a).is_empty(), "alice must not receive her echo");
}

#[test]
fn joins_and_leaves_update_current_connections() {
    let service = service();
    let alice = register(&service, "alice");
    let case = create_case(&service, &alice, "presence");

    let sub_a = service
        .subscribe(&alice.principal, case, "ch-a")
        .expect("subscribe a");
    let joined = drain(&sub_a);
    assert_eq!(usernames_in(joined.last().expect("join message")), ["alice"]);

    let _sub_b = service
        .subscribe(&alice.principal, case, "ch-b")
        .expect("subscribe b");
    let update = sub_a.recv().expect("update after join");
    assert_eq!(usernames_in(&update), ["alice", "alice"]);

    service.unsubscribe(case, "ch-b").expect("unsubscribe");
    let update = sub_a.recv().expect("update after leave");
    assert_eq!(usernames_in(&update), ["alice"]);
}

#[test]
fn subscription_requires_read_permission() {
    let service = service();
    let alice = register(&service, "alice");
    let mallory = register(&service, "mallory");
    let case = create_case(&service, &alice, "gated");

    let err = service
        .subscribe(&mallory.principal, case, "ch-m")
        .expect_err("no read, no channel");
    assert_eq!(err.code(), "forbidden");
}

#[test]
fn pings_are_silently_ignored() {
    let service = service();
    let alice = register(&service, "alice");
    let case = create_case(&service, &alice, "ping");

    let sub = service
        .subscribe(&alice.principal, case, "ch-a")
        .expect("subscribe");
    drain(&sub);

    service
        .handle_client_message(&alice.principal, case, "ch-a", r#"{"content":"ping"}"#)
        .expect("ping");
    assert!(drain(&sub).is_empty());
}

#[test]
fn parse_failures_answer_only_the_offender() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let case = create_case(&service, &alice, "badmsg");
    service
        .share_with(
            &alice.principal,
            case,
            &[ShareEntry {
                email: "bob@example.org".into(),
                view: Some(true),
                edit: None,
                review: None,
            }],
        )
        .expect("share");

    let sub_a = service
        .subscribe(&alice.principal, case, "ch-a")
        .expect("subscribe a");
    let sub_b = service
        .subscribe(&bob.principal, case, "ch-b")
        .expect("subscribe b");
    drain(&sub_a);
    drain(&sub_b);

    service
        .handle_client_message(&alice.principal, case, "ch-a", "{not json")
        .expect("handled");

    let reply = sub_a.recv().expect("error reply");
    assert_eq!(reply.kind, "error");
    let content = reply.content.as_ref().and_then(|c| c.as_str()).expect("text");
    assert!(content.starts_with("ERROR: Could not parse"));
    assert!(drain(&sub_b).is_empty(), "others see nothing");
}

#[test]
fn element_locks_are_rebroadcast_to_others() {
    let service = service();
    let alice = register(&service, "alice");
    let bob = register(&service, "bob");
    let case = create_case(&service, &alice, "locks");
    service
        .share_with(
            &alice.principal,
            case,
            &[ShareEntry {
                email: "bob@example.org".into(),
                view: Some(true),
                edit: Some(true),
                review: None,
            }],
        )
        .expect("share");
    let goal = add_goal(&service, &alice, case);

    let sub_a = service
        .subscribe(&alice.principal, case, "ch-a")
        .expect("subscribe a");
    let sub_b = service
        .subscribe(&bob.principal, case, "ch-b")
        .expect("subscribe b");
    drain(&sub_a);
    drain(&sub_b);

    let raw = format!(
        r#"{{"element_lock":true,"element_id":"{goal}","action":"lock"}}"#
    );
    service
        .handle_client_message(&alice.principal, case, "ch-a", &raw)
        .expect("lock message");

    let received = sub_b.recv().expect("bob sees the lock");
    let content = received.content.as_ref().expect("content");
    assert_eq!(content["element_lock"], true);
    assert_eq!(content["action"], "lock");
    assert!(drain(&sub_a).is_empty(), "locks are not echoed");
}

#[test]
fn mutations_broadcast_change_events_in_commit_order() {
    let service = service();
    let alice = register(&service, "alice");
    let case = create_case(&service, &alice, "events");

    let sub = service
        .subscribe(&alice.principal, case, "ch-a")
        .expect("subscribe");
    drain(&sub);

    let goal = add_goal(&service, &alice, case);
    let _claim = fixtures::add_claim(&service, &alice, case, ParentInfo::goal(goal));

    let first = sub.recv().expect("first event");
    let second = sub.recv().expect("second event");
    assert_eq!(first.kind, "element_created");
    assert_eq!(first.content.as_ref().expect("content")["kind"], "goal");
    assert_eq!(second.kind, "element_created");
    assert_eq!(
        second.content.as_ref().expect("content")["kind"],
        "property_claim"
    );
}
