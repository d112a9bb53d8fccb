//! Change notification for consuming surfaces.

use crate::model::notification::NotificationKey;
use crate::reconcile::reducer::ApplyOutcome;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

/// What changed in the reconciled map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedChangeKind {
    Applied {
        key: NotificationKey,
        outcome: ApplyOutcome,
    },
    ReadChanged {
        keys: Vec<NotificationKey>,
    },
    Evicted {
        keys: Vec<NotificationKey>,
    },
}

/// One change event delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChange {
    pub kind: FeedChangeKind,
    /// Unread count right after the change was applied.
    pub unread_count: usize,
}

type Observer = Arc<dyn Fn(&FeedChange) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: Mutex<Vec<(ObserverId, Observer)>>,
}

impl ObserverRegistry {
    pub(crate) fn subscribe(&self, observer: Observer) -> ObserverId {
        let id = ObserverId(Uuid::new_v4());
        self.observers.lock().push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Calls every observer without holding the registry lock, so callbacks
    /// may query the engine or (un)subscribe.
    pub(crate) fn notify(&self, change: &FeedChange) {
        let snapshot: Vec<Observer> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            observer(change);
        }
    }
}
