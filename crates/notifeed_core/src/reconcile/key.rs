//! Entity key resolution.
//!
//! # Invariants
//! - `resolve_key` is pure and total: every event yields a key.
//! - Keys depend only on event fields, never on process-local counters.

use crate::model::event::{KeyComposition, RawEvent};
use crate::model::notification::NotificationKey;

/// Maps a raw event to its canonical deduplication key.
///
/// Entity types that compose a sub-resource fall back to the default
/// `(entity_type, entity_id)` form when the event carries no sub id.
pub fn resolve_key(event: &RawEvent) -> NotificationKey {
    let entity_type = event.parsed_entity_type();
    let entity_id = event.entity_id.trim();

    let sub_entity_id = event
        .sub_entity_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (entity_type.key_composition(), sub_entity_id) {
        (KeyComposition::EntityWithSubResource, Some(sub)) => {
            NotificationKey::with_sub_resource(entity_type, entity_id, sub)
        }
        _ => NotificationKey::entity(entity_type, entity_id),
    }
}
