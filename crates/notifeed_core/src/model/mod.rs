//! Domain model for the notification reconciliation engine.
//!
//! # Responsibility
//! - Define the raw event contract delivered by the change feed.
//! - Define the reconciled notification record and its canonical key.
//!
//! # Invariants
//! - Entity types and states are closed tagged sets with an explicit
//!   `Unknown` variant; raw strings never travel past ingestion.
//! - A `NotificationKey` is stable for the lifetime of its entity.

pub mod event;
pub mod notification;
