//! Raw change events and their ingestion-time vocabulary.
//!
//! # Responsibility
//! - Carry the feed-level `RawEvent` shape (serde wire form, snake_case).
//! - Parse free-form entity type / state tags into closed variant sets.
//! - Validate the required fields before an event may be folded.
//!
//! # Invariants
//! - Parsing a tag never fails; unrecognized values become `Unknown(..)`.
//! - Display payload is opaque to reconciliation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Unix epoch milliseconds, as stamped by the source clock.
pub type EpochMillis = i64;

const ENTITY_MATCH_REQUEST: &str = "match_request";
const ENTITY_MATCH_REQUEST_FORWARD: &str = "match_request_forward";

/// How a notification key is composed for an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyComposition {
    /// `(entity_type, entity_id)`.
    Entity,
    /// `(entity_type, entity_id, sub_entity_id)`.
    EntityWithSubResource,
}

/// Entity type tag carried by raw events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    /// A match request raised by a user.
    MatchRequest,
    /// One forward of a match request to a specific recipient.
    MatchRequestForward,
    /// Any tag outside the known set, normalized to lowercase.
    Unknown(String),
}

impl EntityType {
    /// Parses a tag; whitespace and case are ignored.
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            ENTITY_MATCH_REQUEST => Self::MatchRequest,
            ENTITY_MATCH_REQUEST_FORWARD => Self::MatchRequestForward,
            _ => Self::Unknown(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::MatchRequest => ENTITY_MATCH_REQUEST,
            Self::MatchRequestForward => ENTITY_MATCH_REQUEST_FORWARD,
            Self::Unknown(value) => value.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Key composition rule for this entity type.
    pub fn key_composition(&self) -> KeyComposition {
        match self {
            Self::MatchRequestForward => KeyComposition::EntityWithSubResource,
            Self::MatchRequest | Self::Unknown(_) => KeyComposition::Entity,
        }
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.as_str().to_string()
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state tag carried by raw events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationState {
    Submitted,
    Pending,
    Forwarded,
    Reopened,
    Approved,
    Rejected,
    /// Any tag outside the known set, normalized to lowercase.
    Unknown(String),
}

impl NotificationState {
    /// Parses a tag; whitespace and case are ignored.
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "submitted" => Self::Submitted,
            "pending" => Self::Pending,
            "forwarded" => Self::Forwarded,
            "reopened" => Self::Reopened,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::Unknown(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Submitted => "submitted",
            Self::Pending => "pending",
            Self::Forwarded => "forwarded",
            Self::Reopened => "reopened",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Unknown(value) => value.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for NotificationState {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<NotificationState> for String {
    fn from(value: NotificationState) -> Self {
        value.as_str().to_string()
    }
}

impl Display for NotificationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering-only fields attached to an event.
///
/// Never consulted for deduplication or ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Open-ended display fields the feed may add over time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DisplayPayload {
    /// Payload with only a title set.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// One change notification as delivered by the feed.
///
/// Required tags are kept as raw strings so that a malformed event can still
/// be represented and reported; `validate()` gates folding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub entity_id: String,
    /// Consulted only by entity types with sub-resource key composition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_entity_id: Option<String>,
    #[serde(default)]
    pub state: String,
    /// Source clock; not guaranteed monotonic across events.
    pub occurred_at: EpochMillis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default)]
    pub payload: DisplayPayload,
}

impl RawEvent {
    /// Builds an event with empty payload and no actor.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        state: impl Into<String>,
        occurred_at: EpochMillis,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            sub_entity_id: None,
            state: state.into(),
            occurred_at,
            actor: None,
            payload: DisplayPayload::default(),
        }
    }

    pub fn with_sub_entity(mut self, sub_entity_id: impl Into<String>) -> Self {
        self.sub_entity_id = Some(sub_entity_id.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_payload(mut self, payload: DisplayPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Checks that every field required for folding is present.
    ///
    /// # Errors
    /// - Returns the first missing (empty or whitespace-only) required field.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.entity_type.trim().is_empty() {
            return Err(EventValidationError::MissingEntityType);
        }
        if self.entity_id.trim().is_empty() {
            return Err(EventValidationError::MissingEntityId);
        }
        if self.state.trim().is_empty() {
            return Err(EventValidationError::MissingState);
        }
        Ok(())
    }

    pub fn parsed_entity_type(&self) -> EntityType {
        EntityType::parse(&self.entity_type)
    }

    pub fn parsed_state(&self) -> NotificationState {
        NotificationState::parse(&self.state)
    }
}

/// Reasons a raw event is dropped before reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventValidationError {
    MissingEntityType,
    MissingEntityId,
    MissingState,
}

impl EventValidationError {
    /// Name of the missing field, for diagnostics.
    pub fn field(self) -> &'static str {
        match self {
            Self::MissingEntityType => "entity_type",
            Self::MissingEntityId => "entity_id",
            Self::MissingState => "state",
        }
    }
}

impl Display for EventValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "event is missing required field `{}`", self.field())
    }
}

impl Error for EventValidationError {}
