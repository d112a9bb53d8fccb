//! Notification engine: the single owner of the reconciled map.
//!
//! # Responsibility
//! - Ingest raw events, fold them, and expose read-only derived views.
//! - Apply read-state mutations and persist them through the store.
//! - Notify observers after every effective change.
//!
//! # Invariants
//! - One mutex guards the reconciled map; applies and read mutations for
//!   any key are linearized through it.
//! - No store I/O and no observer callback runs while that lock is held.
//! - Read-state jobs are submitted under that lock, so the store sees writes
//!   in the same order as the in-memory mutations.
//! - New keys are created unread; the stored flag is applied later and only
//!   if nothing else decided the flag first.

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticsLog};
use crate::feed::query::{self as feed_view, FeedFilter, FeedQuery};
use crate::model::event::{EntityType, EpochMillis, RawEvent};
use crate::model::notification::{Notification, NotificationKey};
use crate::reconcile::priority::PriorityTable;
use crate::reconcile::reducer::{ApplyOutcome, ReconciledMap, ResolvedEvent};
use crate::reconcile::retention::RetentionPolicy;
use crate::store::worker::{HydrationSink, InlineJob, ReadStateWorker};
use crate::store::ReadStateStore;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

mod observer;
pub mod subscription;

pub use observer::{FeedChange, FeedChangeKind, ObserverId};
use observer::ObserverRegistry;

struct EngineShared {
    map: Arc<Mutex<ReconciledMap>>,
    priorities: PriorityTable,
    retention: RetentionPolicy,
    read_state: ReadStateWorker,
    observers: Arc<ObserverRegistry>,
    diagnostics: Arc<DiagnosticsLog>,
}

/// Cheaply clonable handle to one engine instance.
///
/// Created when a session mounts, torn down with `shutdown()` (or when the
/// last handle drops).
#[derive(Clone)]
pub struct NotificationEngine {
    shared: Arc<EngineShared>,
}

impl NotificationEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn ReadStateStore>) -> Self {
        let diagnostics = Arc::new(DiagnosticsLog::new(config.diagnostics_capacity));
        let map = Arc::new(Mutex::new(ReconciledMap::new()));
        let observers = Arc::new(ObserverRegistry::default());
        let read_state = ReadStateWorker::spawn(
            store,
            config.persist_retry,
            Arc::clone(&diagnostics),
            hydration_sink(Arc::clone(&map), Arc::clone(&observers)),
        );
        info!(
            "event=engine_start module=engine status=ok retention_max_entries={:?} retention_max_age_ms={:?}",
            config.retention.max_entries, config.retention.max_age_ms
        );

        Self {
            shared: Arc::new(EngineShared {
                map,
                priorities: config.priorities,
                retention: config.retention,
                read_state,
                observers,
                diagnostics,
            }),
        }
    }

    /// Engine with default configuration.
    pub fn with_store(store: Arc<dyn ReadStateStore>) -> Self {
        Self::new(EngineConfig::default(), store)
    }

    /// Folds one raw event. Never fails; malformed input is `Rejected`.
    pub fn on_event(&self, event: RawEvent) -> ApplyOutcome {
        let entity_id = event.entity_id.trim().to_string();
        let resolved = match ResolvedEvent::resolve(event, &self.shared.priorities) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.shared.diagnostics.report(Diagnostic::MalformedEvent {
                    field: err.field(),
                    entity_id,
                });
                return ApplyOutcome::Rejected;
            }
        };
        self.report_vocabulary(&resolved);

        let key = resolved.key.clone();
        let (report, unread_count, inline) = {
            let mut map = self.shared.map.lock();
            let report = map.apply(resolved);
            let inline = if report.outcome == ApplyOutcome::Created {
                self.shared.read_state.hydrate(key.clone())
            } else if report.resurfaced {
                self.shared.read_state.persist(vec![key.clone()], false)
            } else {
                None
            };
            (report, map.unread_count(), inline)
        };
        run_inline(inline);

        debug!(
            "event=apply module=engine status=ok key={key} outcome={:?} resurfaced={}",
            report.outcome, report.resurfaced
        );

        if report.outcome.changes_view() {
            self.shared.observers.notify(&FeedChange {
                kind: FeedChangeKind::Applied {
                    key,
                    outcome: report.outcome,
                },
                unread_count,
            });
        }
        report.outcome
    }

    /// Folds a batch of events in delivery order.
    pub fn on_events(&self, events: impl IntoIterator<Item = RawEvent>) -> Vec<ApplyOutcome> {
        events.into_iter().map(|event| self.on_event(event)).collect()
    }

    /// Fresh ordered snapshot of the feed.
    pub fn list_notifications(&self, query: &FeedQuery) -> Vec<Notification> {
        let map = self.shared.map.lock();
        feed_view::list_notifications(map.notifications(), query)
    }

    pub fn group_by_entity_type(
        &self,
        filter: &FeedFilter,
    ) -> BTreeMap<EntityType, Vec<Notification>> {
        let map = self.shared.map.lock();
        feed_view::group_by_entity_type(map.notifications(), filter)
    }

    pub fn get(&self, key: &NotificationKey) -> Option<Notification> {
        self.shared.map.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.map.lock().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.shared.map.lock().unread_count()
    }

    /// Marks one notification read. Unknown keys are a no-op.
    ///
    /// Returns whether the flag changed.
    pub fn mark_read(&self, key: &NotificationKey) -> bool {
        let (changed, unread_count, inline) = {
            let mut map = self.shared.map.lock();
            let changed = map.mark_read(key);
            let inline = match changed {
                Some(true) => self.shared.read_state.persist(vec![key.clone()], true),
                _ => None,
            };
            (changed, map.unread_count(), inline)
        };
        run_inline(inline);
        match changed {
            Some(true) => {
                self.shared.observers.notify(&FeedChange {
                    kind: FeedChangeKind::ReadChanged {
                        keys: vec![key.clone()],
                    },
                    unread_count,
                });
                true
            }
            Some(false) => false,
            None => {
                debug!("event=mark_read module=engine status=skip reason=unknown_key key={key}");
                false
            }
        }
    }

    /// Marks every current notification read, persisted as one batch.
    ///
    /// Returns how many flags changed.
    pub fn mark_all_read(&self) -> usize {
        let (changed, unread_count, inline) = {
            let mut map = self.shared.map.lock();
            let changed = map.mark_all_read();
            let inline = self.shared.read_state.persist(changed.clone(), true);
            (changed, map.unread_count(), inline)
        };
        run_inline(inline);
        let count = changed.len();
        if count > 0 {
            self.shared.observers.notify(&FeedChange {
                kind: FeedChangeKind::ReadChanged { keys: changed },
                unread_count,
            });
        }
        count
    }

    /// Runs the configured retention policy and returns evicted keys.
    pub fn sweep(&self, now_ms: EpochMillis) -> Vec<NotificationKey> {
        let (evicted, unread_count) = {
            let mut map = self.shared.map.lock();
            let evicted = self.shared.retention.sweep(&mut map, now_ms);
            (evicted, map.unread_count())
        };
        if !evicted.is_empty() {
            info!(
                "event=retention_sweep module=engine status=ok evicted={}",
                evicted.len()
            );
            self.shared.observers.notify(&FeedChange {
                kind: FeedChangeKind::Evicted {
                    keys: evicted.clone(),
                },
                unread_count,
            });
        }
        evicted
    }

    /// Registers a change observer.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&FeedChange) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(Arc::new(observer))
    }

    /// Removes an observer. Returns `false` for an unknown id.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.shared.observers.unsubscribe(id)
    }

    /// Recent diagnostics, oldest first.
    pub fn recent_diagnostics(&self) -> Vec<Diagnostic> {
        self.shared.diagnostics.recent()
    }

    /// Blocks until queued read-state loads and writes have finished.
    pub fn flush_read_state(&self) {
        self.shared.read_state.flush();
    }

    /// Drains pending read-state jobs and stops the worker.
    ///
    /// In-memory state stays queryable; later store calls run inline.
    pub fn shutdown(&self) {
        self.shared.read_state.shutdown();
        info!("event=engine_shutdown module=engine status=ok");
    }

    fn report_vocabulary(&self, event: &ResolvedEvent) {
        if !event.entity_type.is_known() {
            self.shared.diagnostics.report(Diagnostic::UnknownEntityType {
                entity_type: event.entity_type.as_str().to_string(),
                key: event.key.storage_key(),
            });
        }
        if !event.priority_configured {
            self.shared.diagnostics.report(Diagnostic::UnknownState {
                entity_type: event.entity_type.as_str().to_string(),
                state: event.state.as_str().to_string(),
                key: event.key.storage_key(),
            });
        }
    }
}

fn run_inline(job: Option<InlineJob>) {
    if let Some(job) = job {
        job.run();
    }
}

/// Applies a stored read flag to an entry created unread.
fn hydration_sink(
    map: Arc<Mutex<ReconciledMap>>,
    observers: Arc<ObserverRegistry>,
) -> HydrationSink {
    Arc::new(move |key: &NotificationKey, read: bool| {
        let (changed, unread_count) = {
            let mut map = map.lock();
            (map.apply_hydrated(key, read), map.unread_count())
        };
        if !changed {
            return;
        }
        debug!("event=hydrate module=engine status=ok key={key} read={read}");
        observers.notify(&FeedChange {
            kind: FeedChangeKind::ReadChanged {
                keys: vec![key.clone()],
            },
            unread_count,
        });
    })
}
