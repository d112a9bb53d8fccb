//! Notification reconciliation engine.
//!
//! Turns a stream of raw, possibly duplicated and reordered change events
//! into a deduplicated, priority-aware notification feed with an accurate
//! unread count.

pub mod config;
pub mod db;
pub mod diagnostics;
pub mod engine;
pub mod feed;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use diagnostics::Diagnostic;
pub use engine::subscription::{EventSource, FeedSubscription, SourcePoll};
pub use engine::{FeedChange, FeedChangeKind, NotificationEngine, ObserverId};
pub use feed::query::{FeedFilter, FeedQuery, FeedSort};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::event::{
    DisplayPayload, EntityType, EpochMillis, EventValidationError, NotificationState, RawEvent,
};
pub use model::notification::{Notification, NotificationKey};
pub use reconcile::key::resolve_key;
pub use reconcile::priority::{
    Priority, PriorityConfigError, PriorityTable, UNKNOWN_STATE_PRIORITY,
};
pub use reconcile::reducer::ApplyOutcome;
pub use reconcile::retention::RetentionPolicy;
pub use store::worker::RetryPolicy;
pub use store::sqlite::SqliteReadStateStore;
pub use store::{MemoryReadStateStore, ReadStateError, ReadStateResult, ReadStateStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
