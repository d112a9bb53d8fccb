//! Derived read-only views over the reconciled map.
//!
//! # Responsibility
//! - Produce ordered, filtered, paginated feed snapshots.
//! - Maintain the unread counter.
//!
//! # Invariants
//! - Every view is a fresh snapshot; no cursor state survives a call.

pub mod query;
pub mod unread;
