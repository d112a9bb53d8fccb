//! Optional retention sweep over the reconciled map.
//!
//! # Invariants
//! - An empty policy never evicts.
//! - Age eviction runs first; the entry cap then evicts lowest priority,
//!   then oldest `latest_occurred_at`, then lowest key.

use crate::model::event::EpochMillis;
use crate::model::notification::NotificationKey;
use crate::reconcile::reducer::ReconciledMap;
use serde::{Deserialize, Serialize};

/// Caller-supplied retention policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Drop entries whose `latest_occurred_at` is older than this.
    #[serde(default)]
    pub max_age_ms: Option<i64>,
    /// Cap on total entries.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl RetentionPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.max_age_ms.is_none() && self.max_entries.is_none()
    }

    /// Removes entries selected by this policy and returns their keys, sorted.
    pub fn sweep(&self, map: &mut ReconciledMap, now_ms: EpochMillis) -> Vec<NotificationKey> {
        let mut evicted = self.select(map, now_ms);
        for key in &evicted {
            map.remove(key);
        }
        evicted.sort();
        evicted
    }

    fn select(&self, map: &ReconciledMap, now_ms: EpochMillis) -> Vec<NotificationKey> {
        if self.is_unbounded() {
            return Vec::new();
        }

        let cutoff = self
            .max_age_ms
            .map(|max_age| now_ms.saturating_sub(max_age));

        let mut evicted = Vec::new();
        let mut survivors = Vec::new();
        for notification in map.notifications() {
            match cutoff {
                Some(cutoff) if notification.latest_occurred_at < cutoff => {
                    evicted.push(notification.key.clone());
                }
                _ => survivors.push(notification),
            }
        }

        if let Some(max_entries) = self.max_entries {
            if survivors.len() > max_entries {
                survivors.sort_by(|a, b| {
                    a.priority
                        .cmp(&b.priority)
                        .then(a.latest_occurred_at.cmp(&b.latest_occurred_at))
                        .then_with(|| a.key.cmp(&b.key))
                });
                let overflow = survivors.len() - max_entries;
                evicted.extend(
                    survivors
                        .into_iter()
                        .take(overflow)
                        .map(|notification| notification.key.clone()),
                );
            }
        }

        evicted
    }
}
