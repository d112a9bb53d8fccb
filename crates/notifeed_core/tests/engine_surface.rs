use notifeed_core::{
    ApplyOutcome, Diagnostic, EngineConfig, EntityType, FeedChange, FeedChangeKind, FeedFilter,
    MemoryReadStateStore, NotificationEngine, NotificationKey, RawEvent, ReadStateError,
    ReadStateResult, ReadStateStore, RetentionPolicy, RetryPolicy, UNKNOWN_STATE_PRIORITY,
};
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn engine() -> NotificationEngine {
    NotificationEngine::with_store(Arc::new(MemoryReadStateStore::new()))
}

fn key(id: &str) -> NotificationKey {
    NotificationKey::entity(EntityType::MatchRequest, id)
}

fn recording(engine: &NotificationEngine) -> Arc<Mutex<Vec<FeedChange>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.subscribe(move |change| sink.lock().push(change.clone()));
    seen
}

/// Store whose every call fails.
struct BrokenStore;

impl ReadStateStore for BrokenStore {
    fn get(&self, _key: &NotificationKey) -> ReadStateResult<Option<bool>> {
        Err(ReadStateError::Backend("offline".to_string()))
    }

    fn set_many(&self, _keys: &[NotificationKey], _read: bool) -> ReadStateResult<()> {
        Err(ReadStateError::Backend("offline".to_string()))
    }
}

/// Store whose lookups for `slow` wait until the gate is opened.
struct GatedStore {
    inner: MemoryReadStateStore,
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedStore {
    fn new(inner: MemoryReadStateStore) -> Self {
        Self {
            inner,
            open: Mutex::new(false),
            opened: Condvar::new(),
        }
    }

    fn open_gate(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl ReadStateStore for GatedStore {
    fn get(&self, key: &NotificationKey) -> ReadStateResult<Option<bool>> {
        if key.entity_id == "slow" {
            let mut open = self.open.lock();
            while !*open {
                self.opened.wait(&mut open);
            }
        }
        self.inner.get(key)
    }

    fn set_many(&self, keys: &[NotificationKey], read: bool) -> ReadStateResult<()> {
        self.inner.set_many(keys, read)
    }
}

fn seeded(read: bool, ids: &[&str]) -> MemoryReadStateStore {
    let store = MemoryReadStateStore::new();
    let keys: Vec<NotificationKey> = ids.iter().map(|id| key(id)).collect();
    store.set_many(&keys, read).unwrap();
    store
}

#[test]
fn observers_see_effective_changes_only() {
    let engine = engine();
    let seen = recording(&engine);

    engine.on_event(RawEvent::new("match_request", "1", "submitted", 1_000));
    engine.on_event(RawEvent::new("match_request", "1", "submitted", 1_000));
    engine.on_event(RawEvent::new("match_request", "1", "pending", 500));
    engine.on_event(RawEvent::new("match_request", "1", "approved", 2_000));
    engine.mark_read(&key("1"));
    engine.mark_read(&key("1"));

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen[0].kind,
        FeedChangeKind::Applied {
            key: key("1"),
            outcome: ApplyOutcome::Created
        }
    );
    assert_eq!(seen[0].unread_count, 1);
    assert_eq!(
        seen[1].kind,
        FeedChangeKind::Applied {
            key: key("1"),
            outcome: ApplyOutcome::Advanced
        }
    );
    assert_eq!(
        seen[2].kind,
        FeedChangeKind::ReadChanged {
            keys: vec![key("1")]
        }
    );
    assert_eq!(seen[2].unread_count, 0);
}

#[test]
fn unsubscribed_observer_is_not_called() {
    let engine = engine();
    let calls = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&calls);
    let id = engine.subscribe(move |_| *counter.lock() += 1);

    engine.on_event(RawEvent::new("match_request", "1", "submitted", 1));
    assert!(engine.unsubscribe(id));
    assert!(!engine.unsubscribe(id));
    engine.on_event(RawEvent::new("match_request", "2", "submitted", 1));

    assert_eq!(*calls.lock(), 1);
}

#[test]
fn observer_may_query_engine_during_callback() {
    let engine = engine();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let inner = engine.clone();
    engine.subscribe(move |_| sink.lock().push(inner.unread_count()));

    engine.on_event(RawEvent::new("match_request", "1", "submitted", 1));
    engine.on_event(RawEvent::new("match_request", "2", "submitted", 1));

    assert_eq!(*observed.lock(), vec![1, 2]);
}

#[test]
fn malformed_events_are_dropped_and_reported() {
    let engine = engine();
    let outcome = engine.on_event(RawEvent::new("match_request", "7", "  ", 1));
    assert_eq!(outcome, ApplyOutcome::Rejected);
    assert!(engine.is_empty());

    let decoded: RawEvent =
        serde_json::from_str(r#"{ "entity_id": "8", "state": "submitted", "occurred_at": 5 }"#)
            .unwrap();
    assert_eq!(engine.on_event(decoded), ApplyOutcome::Rejected);

    assert_eq!(
        engine.recent_diagnostics(),
        vec![
            Diagnostic::MalformedEvent {
                field: "state",
                entity_id: "7".to_string()
            },
            Diagnostic::MalformedEvent {
                field: "entity_type",
                entity_id: "8".to_string()
            },
        ]
    );
}

#[test]
fn unknown_vocabulary_is_folded_and_reported() {
    let engine = engine();
    engine.on_event(RawEvent::new("invoice", "9", "paid", 1_000));
    engine.on_event(RawEvent::new("match_request", "1", "escalated", 1_000));

    assert_eq!(engine.len(), 2);
    let escalated = engine.get(&key("1")).unwrap();
    assert_eq!(escalated.priority, UNKNOWN_STATE_PRIORITY);

    // Any known state outranks the unknown one.
    engine.on_event(RawEvent::new("match_request", "1", "pending", 10));
    assert_eq!(engine.get(&key("1")).unwrap().latest_state.as_str(), "pending");

    let diagnostics = engine.recent_diagnostics();
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::UnknownEntityType { entity_type, .. } if entity_type == "invoice")));
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::UnknownState { state, .. } if state == "escalated")));
}

#[test]
fn store_failures_never_block_the_feed() {
    let config = EngineConfig {
        persist_retry: RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
        ..EngineConfig::default()
    };
    let engine = NotificationEngine::new(config, Arc::new(BrokenStore));

    assert_eq!(
        engine.on_event(RawEvent::new("match_request", "1", "submitted", 1)),
        ApplyOutcome::Created
    );
    assert!(engine.mark_read(&key("1")));
    assert_eq!(engine.unread_count(), 0);
    engine.flush_read_state();

    let diagnostics = engine.recent_diagnostics();
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::ReadStateLoadFailed { .. })));
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::ReadStatePersistFailed { attempts: 2, .. })));
    assert!(engine.get(&key("1")).unwrap().read);
}

#[test]
fn slow_hydration_never_stalls_later_events() {
    let store = Arc::new(GatedStore::new(seeded(true, &["slow"])));
    let engine = NotificationEngine::with_store(store.clone());
    let seen = recording(&engine);

    let started = Instant::now();
    let outcomes = engine.on_events([
        RawEvent::new("match_request", "slow", "submitted", 1_000),
        RawEvent::new("match_request", "fast", "submitted", 1_000),
    ]);
    let elapsed = started.elapsed();
    let applied = engine.len();
    let unread_while_blocked = engine.unread_count();
    store.open_gate();
    engine.flush_read_state();

    assert_eq!(outcomes, vec![ApplyOutcome::Created, ApplyOutcome::Created]);
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(applied, 2);
    assert_eq!(unread_while_blocked, 2);

    assert!(engine.get(&key("slow")).unwrap().read);
    assert_eq!(engine.unread_count(), 1);
    let seen = seen.lock();
    assert_eq!(
        seen.last().map(|change| &change.kind),
        Some(&FeedChangeKind::ReadChanged {
            keys: vec![key("slow")]
        })
    );
}

#[test]
fn read_mutation_before_hydration_keeps_its_flag() {
    let store = Arc::new(GatedStore::new(seeded(false, &["slow"])));
    let engine = NotificationEngine::with_store(store.clone());

    engine.on_event(RawEvent::new("match_request", "slow", "submitted", 1_000));
    let marked = engine.mark_read(&key("slow"));
    store.open_gate();
    engine.flush_read_state();

    assert!(marked);
    assert!(engine.get(&key("slow")).unwrap().read);
    assert_eq!(store.get(&key("slow")).unwrap(), Some(true));
}

#[test]
fn key_recreated_after_sweep_is_hydrated_again() {
    let config = EngineConfig {
        retention: RetentionPolicy {
            max_age_ms: Some(1_000),
            max_entries: None,
        },
        ..EngineConfig::default()
    };
    let engine = NotificationEngine::new(config, Arc::new(MemoryReadStateStore::new()));
    engine.on_event(RawEvent::new("match_request", "1", "approved", 100));
    engine.mark_read(&key("1"));
    assert_eq!(engine.sweep(5_000), vec![key("1")]);

    assert_eq!(
        engine.on_event(RawEvent::new("match_request", "1", "approved", 100)),
        ApplyOutcome::Created
    );
    engine.flush_read_state();
    assert!(engine.get(&key("1")).unwrap().read);
    assert_eq!(engine.unread_count(), 0);
}

#[test]
fn retention_sweep_evicts_and_notifies() {
    let config = EngineConfig {
        retention: RetentionPolicy {
            max_age_ms: Some(1_000),
            max_entries: None,
        },
        ..EngineConfig::default()
    };
    let engine = NotificationEngine::new(config, Arc::new(MemoryReadStateStore::new()));
    engine.on_event(RawEvent::new("match_request", "old", "approved", 100));
    engine.on_event(RawEvent::new("match_request", "new", "pending", 4_500));
    let seen = recording(&engine);

    let evicted = engine.sweep(5_000);
    assert_eq!(evicted, vec![key("old")]);
    assert_eq!(engine.len(), 1);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(seen.lock()[0].unread_count, 1);

    assert!(engine.sweep(5_000).is_empty());
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn grouping_splits_by_entity_type() {
    let engine = engine();
    engine.on_event(RawEvent::new("match_request", "1", "submitted", 1));
    engine.on_event(RawEvent::new("match_request", "2", "submitted", 2));
    engine.on_event(
        RawEvent::new("match_request_forward", "1", "forwarded", 3).with_sub_entity("bob"),
    );

    let groups = engine.group_by_entity_type(&FeedFilter::default());
    assert_eq!(groups.len(), 2);
    let requests = &groups[&EntityType::MatchRequest];
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].key, key("2"));
    assert_eq!(groups[&EntityType::MatchRequestForward].len(), 1);
}

#[test]
fn attached_feed_is_consumed_until_detached() {
    let engine = engine();
    let (sender, receiver) = mpsc::channel();
    let subscription = engine.attach(receiver).unwrap();

    sender
        .send(RawEvent::new("match_request", "1", "submitted", 1_000))
        .unwrap();
    sender
        .send(RawEvent::new("match_request", "1", "approved", 2_000))
        .unwrap();
    sender
        .send(RawEvent::new("match_request", "1", "submitted", 1_000))
        .unwrap();

    sender
        .send(RawEvent::new("match_request", "marker", "pending", 4_000))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.get(&key("marker")).is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    let consumed = subscription.detach();
    assert_eq!(consumed, 4);
    assert!(sender
        .send(RawEvent::new("match_request", "2", "submitted", 3_000))
        .is_err());

    let notification = engine.get(&key("1")).unwrap();
    assert_eq!(notification.latest_state.as_str(), "approved");
    assert_eq!(notification.revision_count, 2);
    assert!(engine.get(&key("2")).is_none());
}

#[test]
fn subscription_finishes_when_source_closes() {
    let engine = engine();
    let (sender, receiver) = mpsc::channel();
    let subscription = engine.attach(receiver).unwrap();
    sender
        .send(RawEvent::new("match_request", "1", "pending", 1))
        .unwrap();
    drop(sender);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !subscription.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(subscription.is_finished());
    assert_eq!(subscription.detach(), 1);
    assert_eq!(engine.len(), 1);
}

#[test]
fn concurrent_applies_and_read_mutations_keep_count_consistent() {
    let engine = engine();
    let writers: Vec<_> = (0..4)
        .map(|worker| {
            let engine = engine.clone();
            thread::spawn(move || {
                for round in 0..200i64 {
                    let id = format!("{}", round % 25);
                    let state = if (round + worker) % 3 == 0 { "approved" } else { "pending" };
                    engine.on_event(RawEvent::new("match_request", id, state, round));
                }
            })
        })
        .collect();
    let reader = {
        let engine = engine.clone();
        thread::spawn(move || {
            for round in 0..200 {
                engine.mark_read(&key(&format!("{}", round % 25)));
                if round % 50 == 0 {
                    engine.mark_all_read();
                }
            }
        })
    };
    for handle in writers {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    let all = engine.list_notifications(&Default::default());
    assert_eq!(all.len(), 25);
    let unread = all.iter().filter(|n| !n.read).count();
    assert_eq!(engine.unread_count(), unread);
}

#[test]
fn persisted_read_state_matches_memory_under_contention() {
    let store = Arc::new(MemoryReadStateStore::new());
    let engine = NotificationEngine::with_store(store.clone());
    let writers: Vec<_> = (0..3)
        .map(|worker| {
            let engine = engine.clone();
            thread::spawn(move || {
                for round in 0..300i64 {
                    let id = format!("{}", round % 10);
                    let state = match (round + worker) % 4 {
                        0 => "pending",
                        1 => "submitted",
                        2 => "reopened",
                        _ => "approved",
                    };
                    engine.on_event(RawEvent::new("match_request", id, state, round * 3 + worker));
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..2)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                for round in 0..300 {
                    engine.mark_read(&key(&format!("{}", round % 10)));
                }
            })
        })
        .collect();
    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
    engine.flush_read_state();

    for notification in engine.list_notifications(&Default::default()) {
        let stored = store.get(&notification.key).unwrap().unwrap_or(false);
        assert_eq!(stored, notification.read, "key {}", notification.key);
    }
}
