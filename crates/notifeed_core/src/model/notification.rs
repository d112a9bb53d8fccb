//! Reconciled notification record and its canonical key.
//!
//! # Invariants
//! - Exactly one `Notification` exists per `NotificationKey`.
//! - `latest_state` reflects the highest-priority state observed,
//!   tie-broken by `occurred_at`.

use crate::model::event::{DisplayPayload, EntityType, EpochMillis, NotificationState};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Canonical deduplication identity of a logical entity's notification stream.
///
/// Ordering is total and used as the final feed tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationKey {
    pub entity_type: EntityType,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_entity_id: Option<String>,
}

impl NotificationKey {
    /// Key composed of entity type and id only.
    pub fn entity(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            sub_entity_id: None,
        }
    }

    /// Key that also carries a sub-resource id.
    pub fn with_sub_resource(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        sub_entity_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            sub_entity_id: Some(sub_entity_id.into()),
        }
    }

    /// Stable textual form used by read-state storage.
    ///
    /// Format: `type:entity_id[:sub_entity_id]`, each component with `%` and
    /// `:` percent-escaped so distinct keys never share a storage row.
    pub fn storage_key(&self) -> String {
        let mut out = escape_component(self.entity_type.as_str());
        out.push(':');
        out.push_str(&escape_component(&self.entity_id));
        if let Some(sub) = &self.sub_entity_id {
            out.push(':');
            out.push_str(&escape_component(sub));
        }
        out
    }
}

fn escape_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

impl Display for NotificationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)?;
        if let Some(sub) = &self.sub_entity_id {
            write!(f, ":{sub}")?;
        }
        Ok(())
    }
}

/// Reconciled, displayable record for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub key: NotificationKey,
    pub entity_type: EntityType,
    pub latest_state: NotificationState,
    /// Priority of `latest_state` under the active priority table.
    pub priority: i32,
    pub latest_occurred_at: EpochMillis,
    /// Earliest `occurred_at` among all events folded into this record.
    pub first_occurred_at: EpochMillis,
    /// Actor of the event that produced `latest_state`.
    pub actor: Option<String>,
    pub display_payload: DisplayPayload,
    pub read: bool,
    /// Distinct raw events folded in. Diagnostic only.
    pub revision_count: u32,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        !self.read
    }
}
