//! Reconciliation reducer over the canonical notification map.
//!
//! # Responsibility
//! - Fold resolved events into exactly one `Notification` per key.
//! - Apply the priority-then-recency rule so replays never regress state.
//! - Keep the unread counter consistent with every mutation.
//!
//! # Invariants
//! - `apply` performs no I/O. New entries start unread; a stored read flag
//!   arrives later through `apply_hydrated`.
//! - Re-applying an identical event (same key, state, `occurred_at`) is a no-op
//!   while its revision is still tracked (see `MAX_TRACKED_REVISIONS`).
//! - Final `latest_state` / `latest_occurred_at` are independent of the
//!   order in which a set of events was applied.
//! - Read mutations never touch `latest_state` or `priority`.

use crate::feed::unread::UnreadCounter;
use crate::model::event::{
    DisplayPayload, EntityType, EpochMillis, EventValidationError, NotificationState, RawEvent,
};
use crate::model::notification::{Notification, NotificationKey};
use crate::reconcile::key::resolve_key;
use crate::reconcile::priority::{Priority, PriorityTable, UNKNOWN_STATE_PRIORITY};
use std::collections::{BTreeSet, HashMap};

/// Distinct `(occurred_at, state)` revisions remembered per key.
///
/// Once exceeded, the oldest revision is forgotten. A redelivery of a
/// forgotten revision can never win the fold again, so it only counts as a
/// `Stale` event and bumps `revision_count`.
pub const MAX_TRACKED_REVISIONS: usize = 64;

/// Event after validation, key resolution and priority lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEvent {
    pub key: NotificationKey,
    pub entity_type: EntityType,
    pub state: NotificationState,
    pub priority: Priority,
    /// `false` when the pair was absent from the table and got the sentinel.
    pub priority_configured: bool,
    pub occurred_at: EpochMillis,
    pub actor: Option<String>,
    pub payload: DisplayPayload,
}

impl ResolvedEvent {
    /// Validates and resolves a raw event at the ingestion boundary.
    ///
    /// # Errors
    /// - Returns the missing required field for malformed events.
    pub fn resolve(
        event: RawEvent,
        priorities: &PriorityTable,
    ) -> Result<Self, EventValidationError> {
        event.validate()?;

        let key = resolve_key(&event);
        let entity_type = key.entity_type.clone();
        let state = event.parsed_state();
        let configured = priorities.lookup(&entity_type, &state);

        Ok(Self {
            key,
            entity_type,
            state,
            priority: configured.unwrap_or(UNKNOWN_STATE_PRIORITY),
            priority_configured: configured.is_some(),
            occurred_at: event.occurred_at,
            actor: event.actor,
            payload: event.payload,
        })
    }
}

/// What one fold step did to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First event for the key.
    Created,
    /// Higher-priority state replaced the stored one.
    Advanced,
    /// Equal priority, newer timestamp refreshed the record.
    Refreshed,
    /// Exact redelivery of an event already folded in.
    Replayed,
    /// Older or lower-priority event; only diagnostics changed.
    Stale,
    /// Malformed event dropped before reconciliation.
    Rejected,
}

impl ApplyOutcome {
    /// Whether the visible notification fields changed.
    pub fn changes_view(self) -> bool {
        matches!(self, Self::Created | Self::Advanced | Self::Refreshed)
    }
}

/// Result of one `apply` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    /// A read notification was flipped back to unread.
    pub resurfaced: bool,
}

// Field order drives `Ord`: oldest revisions sort first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Revision {
    occurred_at: EpochMillis,
    state: NotificationState,
}

#[derive(Debug, Clone)]
struct Entry {
    notification: Notification,
    seen: BTreeSet<Revision>,
    /// Set once a read mutation or resurfacing decided the flag; a late
    /// hydration result must not overwrite it.
    read_touched: bool,
}

impl Entry {
    /// Records a revision. Returns `false` for a tracked redelivery.
    fn remember(&mut self, revision: Revision) -> bool {
        if !self.seen.insert(revision) {
            return false;
        }
        if self.seen.len() > MAX_TRACKED_REVISIONS {
            self.seen.pop_first();
        }
        true
    }
}

/// Canonical key -> notification map. Sole source of truth of the engine.
///
/// Memory per key is bounded: each entry keeps at most
/// `MAX_TRACKED_REVISIONS` revisions for duplicate detection.
#[derive(Debug, Default)]
pub struct ReconciledMap {
    entries: HashMap<NotificationKey, Entry>,
    unread: UnreadCounter,
}

impl ReconciledMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &NotificationKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &NotificationKey) -> Option<&Notification> {
        self.entries.get(key).map(|entry| &entry.notification)
    }

    /// Iterates current notifications in unspecified order.
    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.entries.values().map(|entry| &entry.notification)
    }

    pub fn unread_count(&self) -> usize {
        self.unread.get()
    }

    /// Folds one resolved event. A `Created` entry starts unread.
    pub fn apply(&mut self, event: ResolvedEvent) -> ApplyReport {
        let revision = Revision {
            occurred_at: event.occurred_at,
            state: event.state.clone(),
        };

        let Some(entry) = self.entries.get_mut(&event.key) else {
            self.unread.on_insert(false);
            let notification = Notification {
                key: event.key.clone(),
                entity_type: event.entity_type,
                latest_state: event.state,
                priority: event.priority,
                latest_occurred_at: event.occurred_at,
                first_occurred_at: event.occurred_at,
                actor: event.actor,
                display_payload: event.payload,
                read: false,
                revision_count: 1,
            };
            self.entries.insert(
                event.key,
                Entry {
                    notification,
                    seen: BTreeSet::from([revision]),
                    read_touched: false,
                },
            );
            return ApplyReport {
                outcome: ApplyOutcome::Created,
                resurfaced: false,
            };
        };

        if !entry.remember(revision) {
            return ApplyReport {
                outcome: ApplyOutcome::Replayed,
                resurfaced: false,
            };
        }

        let current = &mut entry.notification;
        current.revision_count = current.revision_count.saturating_add(1);
        current.first_occurred_at = current.first_occurred_at.min(event.occurred_at);

        let outcome = if event.priority > current.priority {
            ApplyOutcome::Advanced
        } else if event.priority == current.priority && supersedes_at_equal_priority(&event, current)
        {
            ApplyOutcome::Refreshed
        } else {
            return ApplyReport {
                outcome: ApplyOutcome::Stale,
                resurfaced: false,
            };
        };

        let state_changed = current.latest_state != event.state;
        let resurface = current.read && (outcome == ApplyOutcome::Advanced || state_changed);

        current.latest_state = event.state;
        current.priority = event.priority;
        current.latest_occurred_at = event.occurred_at;
        current.actor = event.actor;
        current.display_payload = event.payload;

        if resurface {
            current.read = false;
            entry.read_touched = true;
            self.unread.on_read_change(true, false);
        }

        ApplyReport {
            outcome,
            resurfaced: resurface,
        }
    }

    /// Applies a read flag loaded from the store after the entry was created.
    ///
    /// Ignored for absent keys and for entries whose flag was already decided
    /// by `mark_read`, `mark_all_read` or resurfacing. Returns whether the flag
    /// changed.
    pub fn apply_hydrated(&mut self, key: &NotificationKey, read: bool) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.read_touched {
            return false;
        }
        entry.read_touched = true;
        let was_read = entry.notification.read;
        if was_read == read {
            return false;
        }
        entry.notification.read = read;
        self.unread.on_read_change(was_read, read);
        true
    }

    /// Marks one key read.
    ///
    /// Returns `None` for an unknown key, otherwise whether the flag changed.
    pub fn mark_read(&mut self, key: &NotificationKey) -> Option<bool> {
        let entry = self.entries.get_mut(key)?;
        entry.read_touched = true;
        let was_read = entry.notification.read;
        entry.notification.read = true;
        self.unread.on_read_change(was_read, true);
        Some(!was_read)
    }

    /// Marks every entry read and returns the keys whose flag changed.
    pub fn mark_all_read(&mut self) -> Vec<NotificationKey> {
        let mut changed = Vec::new();
        for (key, entry) in &mut self.entries {
            entry.read_touched = true;
            if !entry.notification.read {
                entry.notification.read = true;
                self.unread.on_read_change(false, true);
                changed.push(key.clone());
            }
        }
        changed.sort();
        changed
    }

    #[cfg(test)]
    fn tracked_revisions(&self, key: &NotificationKey) -> Option<usize> {
        self.entries.get(key).map(|entry| entry.seen.len())
    }

    /// Removes one entry. Used by retention sweeps only.
    pub fn remove(&mut self, key: &NotificationKey) -> Option<Notification> {
        let entry = self.entries.remove(key)?;
        self.unread.on_remove(entry.notification.read);
        Some(entry.notification)
    }
}

/// Equal-priority rule: newer timestamp wins; an exact timestamp tie between
/// different states resolves on state order.
fn supersedes_at_equal_priority(event: &ResolvedEvent, current: &Notification) -> bool {
    match event.occurred_at.cmp(&current.latest_occurred_at) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => event.state > current.latest_state,
    }
}
