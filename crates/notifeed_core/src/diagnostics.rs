//! Diagnostic channel for dropped, degraded or unpersisted input.
//!
//! # Responsibility
//! - Report malformed events, unknown vocabulary and read-state failures.
//! - Keep a bounded buffer of recent diagnostics for the host to inspect.
//!
//! # Invariants
//! - Reporting never fails and never blocks on I/O.
//! - Buffer size never exceeds its capacity; oldest entries drop first.

use log::warn;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

/// Default number of diagnostics kept in memory.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

/// One diagnostic report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Event missing a required field; dropped.
    MalformedEvent { field: &'static str, entity_id: String },
    /// Entity type outside the known set; folded with default key/priority row.
    UnknownEntityType { entity_type: String, key: String },
    /// State absent from the priority table; folded at sentinel priority.
    UnknownState {
        entity_type: String,
        state: String,
        key: String,
    },
    /// Read-state lookup failed during hydration; treated as unread.
    ReadStateLoadFailed { key: String, error: String },
    /// Read-state write failed after every retry attempt.
    ReadStatePersistFailed {
        keys: usize,
        attempts: u32,
        error: String,
    },
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedEvent { field, entity_id } => {
                write!(f, "malformed event dropped: missing `{field}` (entity_id=`{entity_id}`)")
            }
            Self::UnknownEntityType { entity_type, key } => {
                write!(f, "unknown entity type `{entity_type}` for {key}")
            }
            Self::UnknownState {
                entity_type,
                state,
                key,
            } => write!(f, "unknown state `{state}` for entity type `{entity_type}` ({key})"),
            Self::ReadStateLoadFailed { key, error } => {
                write!(f, "read-state lookup failed for {key}: {error}")
            }
            Self::ReadStatePersistFailed {
                keys,
                attempts,
                error,
            } => write!(
                f,
                "read-state write for {keys} key(s) failed after {attempts} attempt(s): {error}"
            ),
        }
    }
}

impl Diagnostic {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedEvent { .. } => "malformed_event",
            Self::UnknownEntityType { .. } => "unknown_entity_type",
            Self::UnknownState { .. } => "unknown_state",
            Self::ReadStateLoadFailed { .. } => "read_state_load_failed",
            Self::ReadStatePersistFailed { .. } => "read_state_persist_failed",
        }
    }
}

/// Bounded in-memory diagnostic buffer.
#[derive(Debug)]
pub struct DiagnosticsLog {
    capacity: usize,
    recent: Mutex<VecDeque<Diagnostic>>,
}

impl DiagnosticsLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Logs and buffers one diagnostic.
    pub fn report(&self, diagnostic: Diagnostic) {
        warn!(
            "event=diagnostic module=engine status=warn code={} detail={}",
            diagnostic.code(),
            diagnostic
        );
        if self.capacity == 0 {
            return;
        }
        let mut recent = self.recent.lock();
        while recent.len() >= self.capacity {
            recent.pop_front();
        }
        recent.push_back(diagnostic);
    }

    /// Snapshot of buffered diagnostics, oldest first.
    pub fn recent(&self) -> Vec<Diagnostic> {
        self.recent.lock().iter().cloned().collect()
    }
}

impl Default for DiagnosticsLog {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTICS_CAPACITY)
    }
}
