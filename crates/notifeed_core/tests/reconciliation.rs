use notifeed_core::{
    ApplyOutcome, EntityType, FeedQuery, MemoryReadStateStore, NotificationEngine,
    NotificationKey, NotificationState, RawEvent,
};
use std::sync::Arc;

fn engine() -> NotificationEngine {
    NotificationEngine::with_store(Arc::new(MemoryReadStateStore::new()))
}

fn match_request(id: &str, state: &str, occurred_at: i64) -> RawEvent {
    RawEvent::new("match_request", id, state, occurred_at)
}

fn key(id: &str) -> NotificationKey {
    NotificationKey::entity(EntityType::MatchRequest, id)
}

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for index in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(index);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

#[test]
fn stale_replay_scenario_converges_in_every_order() {
    let events = [
        match_request("1", "Submitted", 1_000),
        match_request("1", "Approved", 2_000),
        match_request("1", "Submitted", 500),
    ];

    for order in permutations(&events) {
        let engine = engine();
        engine.on_events(order);

        let notification = engine.get(&key("1")).expect("notification exists");
        assert_eq!(notification.latest_state, NotificationState::Approved);
        assert_eq!(notification.latest_occurred_at, 2_000);
        assert_eq!(notification.revision_count, 3);
        assert_eq!(engine.len(), 1);
    }
}

#[test]
fn applying_the_same_event_twice_equals_applying_once() {
    let once = engine();
    once.on_event(match_request("1", "approved", 2_000));

    let twice = engine();
    twice.on_event(match_request("1", "approved", 2_000));
    assert_eq!(
        twice.on_event(match_request("1", "approved", 2_000)),
        ApplyOutcome::Replayed
    );

    assert_eq!(once.get(&key("1")), twice.get(&key("1")));
    assert_eq!(once.unread_count(), twice.unread_count());
}

#[test]
fn higher_priority_event_after_mark_read_resurfaces() {
    let engine = engine();
    engine.on_event(match_request("1", "submitted", 1_000));
    assert!(engine.mark_read(&key("1")));
    assert_eq!(engine.unread_count(), 0);

    assert_eq!(
        engine.on_event(match_request("1", "approved", 2_000)),
        ApplyOutcome::Advanced
    );
    let notification = engine.get(&key("1")).expect("notification exists");
    assert!(!notification.read);
    assert_eq!(engine.unread_count(), 1);
}

#[test]
fn lower_priority_event_changes_nothing_visible() {
    let engine = engine();
    engine.on_event(match_request("1", "rejected", 2_000));
    engine.mark_read(&key("1"));
    let before = engine.get(&key("1")).expect("notification exists");

    assert_eq!(
        engine.on_event(match_request("1", "pending", 9_000)),
        ApplyOutcome::Stale
    );
    let after = engine.get(&key("1")).expect("notification exists");
    assert_eq!(after.latest_state, before.latest_state);
    assert_eq!(after.latest_occurred_at, before.latest_occurred_at);
    assert_eq!(after.read, before.read);
    assert_eq!(after.revision_count, before.revision_count + 1);
}

#[test]
fn duplicate_redelivery_after_mark_read_stays_read() {
    let engine = engine();
    engine.on_event(match_request("1", "approved", 2_000));
    engine.mark_read(&key("1"));

    engine.on_event(match_request("1", "approved", 2_000));
    engine.on_event(match_request("1", "approved", 1_500));

    assert!(engine.get(&key("1")).expect("notification exists").read);
    assert_eq!(engine.unread_count(), 0);
}

#[test]
fn different_entity_ids_produce_distinct_notifications() {
    let engine = engine();
    engine.on_event(match_request("1", "submitted", 1_000));
    engine.on_event(match_request("2", "submitted", 1_000));

    let listed = engine.list_notifications(&FeedQuery::default());
    assert_eq!(listed.len(), 2);
    assert_ne!(listed[0].key, listed[1].key);
}

#[test]
fn mark_all_read_zeroes_unread_count() {
    let engine = engine();
    for id in ["1", "2", "3"] {
        engine.on_event(match_request(id, "pending", 1_000));
    }
    engine.mark_read(&key("2"));

    assert_eq!(engine.mark_all_read(), 2);
    assert_eq!(engine.unread_count(), 0);
    assert_eq!(engine.list_notifications(&FeedQuery::unread()).len(), 0);
    assert_eq!(engine.mark_all_read(), 0);
}

#[test]
fn mark_read_on_unknown_key_is_a_no_op() {
    let engine = engine();
    assert!(!engine.mark_read(&key("missing")));
    assert!(engine.is_empty());
}

#[test]
fn mark_read_never_changes_reconciled_state() {
    let engine = engine();
    engine.on_event(match_request("1", "reopened", 3_000));
    let before = engine.get(&key("1")).expect("notification exists");

    engine.mark_read(&key("1"));
    engine.mark_all_read();

    let after = engine.get(&key("1")).expect("notification exists");
    assert_eq!(after.latest_state, before.latest_state);
    assert_eq!(after.priority, before.priority);
    assert_eq!(after.latest_occurred_at, before.latest_occurred_at);
}

#[test]
fn forwards_to_separate_recipients_are_not_merged() {
    let engine = engine();
    engine.on_event(
        RawEvent::new("match_request_forward", "1", "forwarded", 1_000).with_sub_entity("alice"),
    );
    engine.on_event(
        RawEvent::new("match_request_forward", "1", "forwarded", 1_000).with_sub_entity("bob"),
    );
    engine.on_event(match_request("1", "submitted", 900));

    assert_eq!(engine.len(), 3);
    assert_eq!(engine.unread_count(), 3);
}

#[test]
fn latest_payload_comes_from_the_winning_event() {
    let engine = engine();
    engine.on_event(
        match_request("1", "approved", 2_000)
            .with_payload(notifeed_core::DisplayPayload::titled("approved title"))
            .with_actor("reviewer"),
    );
    engine.on_event(
        match_request("1", "submitted", 1_000)
            .with_payload(notifeed_core::DisplayPayload::titled("submitted title")),
    );

    let notification = engine.get(&key("1")).expect("notification exists");
    assert_eq!(
        notification.display_payload.title.as_deref(),
        Some("approved title")
    );
    assert_eq!(notification.actor.as_deref(), Some("reviewer"));
    assert_eq!(notification.first_occurred_at, 1_000);
}
