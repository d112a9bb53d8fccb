//! Feed ordering, filtering and grouping.
//!
//! # Invariants
//! - Default ordering: `latest_occurred_at DESC, priority DESC, key ASC`.
//! - Every ordering ends with the key, so output is fully deterministic.

use crate::model::event::{EntityType, NotificationState};
use crate::model::notification::Notification;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Feed ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSort {
    /// `latest_occurred_at DESC, priority DESC, key ASC`.
    #[default]
    Recency,
    /// `first_occurred_at DESC, priority DESC, key ASC`.
    FirstSeen,
    /// `priority DESC, latest_occurred_at DESC, key ASC`.
    Priority,
}

/// Feed filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFilter {
    #[serde(default)]
    pub entity_types: BTreeSet<EntityType>,
    #[serde(default)]
    pub states: BTreeSet<NotificationState>,
    #[serde(default)]
    pub unread_only: bool,
}

impl FeedFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        if self.unread_only && notification.read {
            return false;
        }
        if !self.entity_types.is_empty() && !self.entity_types.contains(&notification.entity_type)
        {
            return false;
        }
        if !self.states.is_empty() && !self.states.contains(&notification.latest_state) {
            return false;
        }
        true
    }
}

/// Query options for listing notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub sort: FeedSort,
    #[serde(default)]
    pub filter: FeedFilter,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl FeedQuery {
    pub fn unread() -> Self {
        Self {
            filter: FeedFilter {
                unread_only: true,
                ..FeedFilter::default()
            },
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, sort: FeedSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// Builds one ordered snapshot from a notification set.
pub fn list_notifications<'a>(
    notifications: impl IntoIterator<Item = &'a Notification>,
    query: &FeedQuery,
) -> Vec<Notification> {
    let mut matched: Vec<&Notification> = notifications
        .into_iter()
        .filter(|notification| query.filter.matches(notification))
        .collect();
    matched.sort_by(|a, b| compare(query.sort, a, b));

    let page = matched.into_iter().skip(query.offset);
    match query.limit {
        Some(limit) => page.take(limit).cloned().collect(),
        None => page.cloned().collect(),
    }
}

/// Groups a filtered snapshot by entity type, each group recency ordered.
pub fn group_by_entity_type<'a>(
    notifications: impl IntoIterator<Item = &'a Notification>,
    filter: &FeedFilter,
) -> BTreeMap<EntityType, Vec<Notification>> {
    let query = FeedQuery {
        filter: filter.clone(),
        ..FeedQuery::default()
    };
    let mut groups: BTreeMap<EntityType, Vec<Notification>> = BTreeMap::new();
    for notification in list_notifications(notifications, &query) {
        groups
            .entry(notification.entity_type.clone())
            .or_default()
            .push(notification);
    }
    groups
}

fn compare(sort: FeedSort, a: &Notification, b: &Notification) -> Ordering {
    let primary = match sort {
        FeedSort::Recency => b
            .latest_occurred_at
            .cmp(&a.latest_occurred_at)
            .then(b.priority.cmp(&a.priority)),
        FeedSort::FirstSeen => b
            .first_occurred_at
            .cmp(&a.first_occurred_at)
            .then(b.priority.cmp(&a.priority)),
        FeedSort::Priority => b
            .priority
            .cmp(&a.priority)
            .then(b.latest_occurred_at.cmp(&a.latest_occurred_at)),
    };
    primary.then_with(|| a.key.cmp(&b.key))
}
