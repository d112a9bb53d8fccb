//! State priority table.
//!
//! # Responsibility
//! - Map `(entity type, state)` to a precedence used by the reducer.
//! - Load per-entity-type policy from external configuration.
//!
//! # Invariants
//! - Lookup is total; unconfigured pairs get `UNKNOWN_STATE_PRIORITY`.
//! - Configured priorities are strictly above the sentinel.

use crate::model::event::{EntityType, NotificationState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Precedence score. Higher wins.
pub type Priority = i32;

/// Sentinel assigned to states absent from the table.
pub const UNKNOWN_STATE_PRIORITY: Priority = 0;

type PriorityRow = BTreeMap<NotificationState, Priority>;

/// Static per-entity-type state precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PriorityTableDoc", into = "PriorityTableDoc")]
pub struct PriorityTable {
    default_row: PriorityRow,
    rows: BTreeMap<EntityType, PriorityRow>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        let default_row = PriorityRow::from([
            (NotificationState::Pending, 10),
            (NotificationState::Submitted, 20),
            (NotificationState::Forwarded, 20),
            (NotificationState::Reopened, 30),
            (NotificationState::Approved, 40),
            (NotificationState::Rejected, 40),
        ]);
        Self {
            default_row,
            rows: BTreeMap::new(),
        }
    }
}

impl PriorityTable {
    /// Parses a table from its JSON document form.
    ///
    /// # Errors
    /// - Returns an error when JSON is malformed or a row fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, PriorityConfigError> {
        serde_json::from_str(json).map_err(|err| PriorityConfigError::Json(err.to_string()))
    }

    /// Replaces the row used by one entity type.
    ///
    /// # Errors
    /// - Returns an error when any priority is at or below the sentinel.
    pub fn with_entity_row(
        mut self,
        entity_type: EntityType,
        row: impl IntoIterator<Item = (NotificationState, Priority)>,
    ) -> Result<Self, PriorityConfigError> {
        let row = row.into_iter().collect::<PriorityRow>();
        validate_row(entity_type.as_str(), &row)?;
        self.rows.insert(entity_type, row);
        Ok(self)
    }

    /// Returns the configured priority, or `None` for an unconfigured pair.
    pub fn lookup(&self, entity_type: &EntityType, state: &NotificationState) -> Option<Priority> {
        self.rows
            .get(entity_type)
            .unwrap_or(&self.default_row)
            .get(state)
            .copied()
    }

    /// Total priority lookup.
    pub fn priority_of(&self, entity_type: &EntityType, state: &NotificationState) -> Priority {
        self.lookup(entity_type, state)
            .unwrap_or(UNKNOWN_STATE_PRIORITY)
    }
}

fn validate_row(row_name: &str, row: &PriorityRow) -> Result<(), PriorityConfigError> {
    for (state, priority) in row {
        if !state.is_known() {
            return Err(PriorityConfigError::UnknownState {
                row: row_name.to_string(),
                state: state.as_str().to_string(),
            });
        }
        if *priority <= UNKNOWN_STATE_PRIORITY {
            return Err(PriorityConfigError::PriorityTooLow {
                row: row_name.to_string(),
                state: state.as_str().to_string(),
                priority: *priority,
            });
        }
    }
    Ok(())
}

/// Serialized form of a priority table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorityTableDoc {
    #[serde(default)]
    pub default: BTreeMap<String, Priority>,
    #[serde(default)]
    pub entity_types: BTreeMap<String, BTreeMap<String, Priority>>,
}

impl TryFrom<PriorityTableDoc> for PriorityTable {
    type Error = PriorityConfigError;

    fn try_from(doc: PriorityTableDoc) -> Result<Self, Self::Error> {
        let default_row = if doc.default.is_empty() {
            Self::default().default_row
        } else {
            parse_row(doc.default)
        };
        validate_row("default", &default_row)?;

        let mut rows = BTreeMap::new();
        for (entity_type, row) in doc.entity_types {
            let entity_type = EntityType::parse(&entity_type);
            let row = parse_row(row);
            validate_row(entity_type.as_str(), &row)?;
            rows.insert(entity_type, row);
        }

        Ok(Self { default_row, rows })
    }
}

impl From<PriorityTable> for PriorityTableDoc {
    fn from(table: PriorityTable) -> Self {
        Self {
            default: format_row(&table.default_row),
            entity_types: table
                .rows
                .iter()
                .map(|(entity_type, row)| (entity_type.as_str().to_string(), format_row(row)))
                .collect(),
        }
    }
}

fn parse_row(row: BTreeMap<String, Priority>) -> PriorityRow {
    row.into_iter()
        .map(|(state, priority)| (NotificationState::parse(&state), priority))
        .collect()
}

fn format_row(row: &PriorityRow) -> BTreeMap<String, Priority> {
    row.iter()
        .map(|(state, priority)| (state.as_str().to_string(), *priority))
        .collect()
}

/// Priority table configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorityConfigError {
    Json(String),
    UnknownState {
        row: String,
        state: String,
    },
    PriorityTooLow {
        row: String,
        state: String,
        priority: Priority,
    },
}

impl Display for PriorityConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(message) => write!(f, "invalid priority table document: {message}"),
            Self::UnknownState { row, state } => {
                write!(f, "priority row `{row}` names unknown state `{state}`")
            }
            Self::PriorityTooLow {
                row,
                state,
                priority,
            } => write!(
                f,
                "priority row `{row}` sets `{state}` to {priority}; must be above {UNKNOWN_STATE_PRIORITY}"
            ),
        }
    }
}

impl Error for PriorityConfigError {}
